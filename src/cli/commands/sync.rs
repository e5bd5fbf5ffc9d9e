//! Sync command - seed and refresh a cache

use super::{github_client, member_gate, open_store, organisation};
use crate::cache::{KeyValueCache, Payload, RefreshScheduler};
use crate::cli::args::SyncArgs;
use crate::config::{CacheKind, CacheSettings, Config};
use crate::error::HarvestResult;
use crate::payload::{ActivityPayload, ProfilePayload};
use crate::quota::{QuotaGate, QuotaState};
use crate::remote::{GithubClient, GithubMembers, RecordSource};
use crate::sync::{SyncJob, SyncReport};
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execute the sync command
pub async fn execute(
    args: SyncArgs,
    config: &Config,
    cancel: &CancellationToken,
) -> HarvestResult<()> {
    let mut settings = config.cache(args.cache);
    if let Some(budget) = args.budget {
        settings.refresh_budget = budget;
    }
    debug!("Sync settings for {:?}: {:?}", args.cache, settings);

    let org = organisation(args.org, config)?;
    let client = github_client(config)?;

    let report = match args.cache {
        CacheKind::Activity => {
            run::<ActivityPayload>(&client, &client, &org, &settings, config, cancel).await?
        }
        CacheKind::Profile => {
            run::<ProfilePayload>(&client, &client, &org, &settings, config, cancel).await?
        }
    };

    print_report(&settings.table, &report);
    Ok(())
}

async fn run<P: Payload>(
    client: &GithubClient,
    source: &dyn RecordSource<P>,
    org: &str,
    settings: &CacheSettings,
    config: &Config,
    cancel: &CancellationToken,
) -> HarvestResult<SyncReport> {
    let store = open_store(config).await?;
    let cache = KeyValueCache::<P>::new(store, settings.table.clone());

    let members = Arc::new(GithubMembers::new(
        client.clone(),
        org,
        config.github.page_size,
    ));
    let mut listing_gate = member_gate(members.clone(), config);
    let mut record_gate = QuotaGate::new(
        Arc::new(client.clone()),
        QuotaState::new(settings.assumed_remaining, settings.safety_floor),
    )
    .with_backoff(Duration::from_secs(config.quota.backoff_secs));

    let job = SyncJob {
        cache: &cache,
        source,
        scheduler: RefreshScheduler::new(settings.refresh_budget),
        pagination_margin: config.quota.pagination_margin,
    };

    job.run(&*members, &mut listing_gate, &mut record_gate, cancel)
        .await
}

fn print_report(table: &str, report: &SyncReport) {
    println!("{} {}", style("Synced").green().bold(), table);
    println!("  discovered      {}", report.discovered);
    println!(
        "  seeded          {} new, {} existing",
        report.seeded.inserted, report.seeded.existing
    );
    println!(
        "  refreshed       {} of {} selected",
        report.refresh.refreshed, report.refresh.selected
    );
    if report.refresh.failed > 0 {
        println!(
            "  {}          {}",
            style("failed").yellow(),
            report.refresh.failed
        );
    }
    if report.refresh.stopped_early {
        println!(
            "  {}",
            style("stopped early: API quota below safety floor").yellow()
        );
    }
}
