//! GitHub API source
//!
//! Organisation members are paged through GraphQL (cursor based, with a total
//! count on the first page). Per-user records come from the REST API, which
//! reports the remaining budget in the `x-ratelimit-remaining` header.
//!
//! `ureq` is blocking, so every request runs on the blocking thread pool.

use super::{Fetched, RecordSource};
use crate::config::schema::GithubConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::pagination::{Page, PageCursor, PageSource};
use crate::payload::{ActivityPayload, ProfilePayload};
use crate::quota::QuotaProbe;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("harvest/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_HEADER: &str = "x-ratelimit-remaining";
const MAX_PAGE_SIZE: u32 = 100;

const MEMBERS_QUERY: &str = r#"
query($org: String!, $first: Int!, $after: String) {
  rateLimit { remaining }
  organization(login: $org) {
    membersWithRole(first: $first, after: $after) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes { login }
    }
  }
}
"#;

const RATE_LIMIT_QUERY: &str = "query { rateLimit { remaining } }";

/// Body and quota header of a completed request
struct RawResponse {
    body: String,
    remaining: Option<u32>,
}

/// Authenticated GitHub API client
#[derive(Clone)]
pub struct GithubClient {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl GithubClient {
    /// Build a client, reading the token from the configured variable
    pub fn from_config(config: &GithubConfig) -> HarvestResult<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HarvestError::TokenMissing(config.token_env.clone()))?;

        Ok(Self::new(&config.api_url, token, config.timeout_secs))
    }

    /// Build a client for an explicit endpoint and token
    pub fn new(api_url: &str, token: String, timeout_secs: u64) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .http_status_as_error(false)
            .build();

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get(&self, path: &str) -> HarvestResult<RawResponse> {
        self.request(path, None).await
    }

    async fn graphql(&self, query: &str, variables: serde_json::Value) -> HarvestResult<RawResponse> {
        let body = serde_json::to_string(&json!({ "query": query, "variables": variables }))?;
        self.request("/graphql", Some(body)).await
    }

    async fn request(&self, path: &str, body: Option<String>) -> HarvestResult<RawResponse> {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.api_url, path);
        let auth = format!("Bearer {}", self.token);
        let endpoint = path.to_string();

        debug!("GitHub request {}", path);
        tokio::task::spawn_blocking(move || send_blocking(&agent, &url, &endpoint, &auth, body))
            .await
            .map_err(|e| HarvestError::Internal(format!("request task failed: {}", e)))?
    }
}

fn send_blocking(
    agent: &ureq::Agent,
    url: &str,
    endpoint: &str,
    auth: &str,
    body: Option<String>,
) -> HarvestResult<RawResponse> {
    let result = match body {
        Some(body) => agent
            .post(url)
            .header("Authorization", auth)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .send(body.as_bytes()),
        None => agent
            .get(url)
            .header("Authorization", auth)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .call(),
    };

    let mut response =
        result.map_err(|e| HarvestError::remote(format!("{}: {}", endpoint, e)))?;

    let remaining = response
        .headers()
        .get(RATE_LIMIT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());
    check_status(endpoint, response.status().as_u16(), remaining)?;

    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| HarvestError::remote(format!("reading {}: {}", endpoint, e)))?;

    Ok(RawResponse { body, remaining })
}

/// Error statuses keep the quota header so callers can still track the budget
fn check_status(endpoint: &str, status: u16, remaining: Option<u32>) -> HarvestResult<()> {
    if status < 400 {
        return Ok(());
    }
    Err(HarvestError::RemoteStatus {
        endpoint: endpoint.to_string(),
        status,
        remaining,
    })
}

fn parse<T: for<'de> Deserialize<'de>>(raw: &RawResponse) -> HarvestResult<T> {
    serde_json::from_str(&raw.body).map_err(|e| HarvestError::RemoteResponse(e.to_string()))
}

#[derive(Deserialize)]
struct RestRateLimit {
    resources: RestResources,
}

#[derive(Deserialize)]
struct RestResources {
    core: RestBucket,
}

#[derive(Deserialize)]
struct RestBucket {
    remaining: u32,
}

#[async_trait]
impl QuotaProbe for GithubClient {
    /// Remaining REST calls; `/rate_limit` itself is free
    async fn probe_quota(&self) -> HarvestResult<u32> {
        let raw = self.get("/rate_limit").await?;
        let limits: RestRateLimit = parse(&raw)?;
        Ok(limits.resources.core.remaining)
    }
}

#[async_trait]
impl RecordSource<ProfilePayload> for GithubClient {
    async fn fetch_record(&self, key: &str) -> HarvestResult<Fetched<ProfilePayload>> {
        let raw = self.get(&format!("/users/{}", key)).await?;
        Ok(Fetched {
            payload: parse(&raw)?,
            remaining_quota: raw.remaining,
        })
    }
}

#[derive(Deserialize)]
struct PublicEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    created_at: Option<DateTime<Utc>>,
    repo: Option<EventRepo>,
}

#[derive(Deserialize)]
struct EventRepo {
    name: String,
}

#[async_trait]
impl RecordSource<ActivityPayload> for GithubClient {
    async fn fetch_record(&self, key: &str) -> HarvestResult<Fetched<ActivityPayload>> {
        let raw = self
            .get(&format!("/users/{}/events/public?per_page=1", key))
            .await?;
        let events: Vec<PublicEvent> = parse(&raw)?;

        Ok(Fetched {
            payload: activity_from_events(events),
            remaining_quota: raw.remaining,
        })
    }
}

fn activity_from_events(events: Vec<PublicEvent>) -> ActivityPayload {
    match events.into_iter().next() {
        Some(event) => ActivityPayload {
            last_activity: event.created_at,
            last_event_type: event.kind,
            last_repo: event.repo.map(|r| r.name),
        },
        None => ActivityPayload::default(),
    }
}

/// Members of one organisation, paged through GraphQL
pub struct GithubMembers {
    client: GithubClient,
    org: String,
    page_size: u32,
}

impl GithubMembers {
    pub fn new(client: GithubClient, org: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            org: org.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

impl<T> GraphqlResponse<T> {
    fn into_data(self) -> HarvestResult<T> {
        if let Some(first) = self.errors.first() {
            return Err(HarvestError::remote(format!("graphql: {}", first.message)));
        }
        self.data
            .ok_or_else(|| HarvestError::RemoteResponse("graphql response without data".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersData {
    rate_limit: Option<GraphqlRateLimit>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct GraphqlRateLimit {
    remaining: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    members_with_role: MemberConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberConnection {
    total_count: u64,
    page_info: PageInfo,
    nodes: Vec<MemberNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberNode {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitData {
    rate_limit: GraphqlRateLimit,
}

fn members_page(org: &str, data: MembersData) -> HarvestResult<Page<String>> {
    let connection = data
        .organization
        .ok_or_else(|| HarvestError::User(format!("Organisation not found: {}", org)))?
        .members_with_role;

    Ok(Page {
        items: connection.nodes.into_iter().map(|n| n.login).collect(),
        next_cursor: connection.page_info.end_cursor.map(PageCursor::Token),
        has_more: connection.page_info.has_next_page,
        total_count: Some(connection.total_count),
        remaining_quota: data.rate_limit.map(|r| r.remaining),
    })
}

#[async_trait]
impl PageSource<String> for GithubMembers {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> HarvestResult<Page<String>> {
        let after = match cursor {
            PageCursor::Start => None,
            PageCursor::Token(token) => Some(token.clone()),
            PageCursor::Number(_) => {
                return Err(HarvestError::Pagination(
                    "organisation members are cursor paginated".into(),
                ))
            }
        };

        let variables = json!({ "org": self.org, "first": self.page_size, "after": after });
        let raw = self.client.graphql(MEMBERS_QUERY, variables).await?;
        let response: GraphqlResponse<MembersData> = parse(&raw)?;

        members_page(&self.org, response.into_data()?)
    }
}

#[async_trait]
impl QuotaProbe for GithubMembers {
    /// Remaining GraphQL points
    async fn probe_quota(&self) -> HarvestResult<u32> {
        let raw = self.client.graphql(RATE_LIMIT_QUERY, json!({})).await?;
        let response: GraphqlResponse<RateLimitData> = parse(&raw)?;
        Ok(response.into_data()?.rate_limit.remaining)
    }
}
