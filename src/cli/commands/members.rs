//! Members command - list organisation members

use super::{github_client, member_gate, organisation};
use crate::cli::args::{MembersArgs, OutputFormat};
use crate::config::Config;
use crate::error::HarvestResult;
use crate::pagination::PageIterator;
use crate::remote::GithubMembers;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Execute the members command
pub async fn execute(
    args: MembersArgs,
    config: &Config,
    cancel: &CancellationToken,
) -> HarvestResult<()> {
    let org = organisation(args.org, config)?;
    let client = github_client(config)?;
    let members = Arc::new(GithubMembers::new(client, org, config.github.page_size));

    let mut gate = member_gate(members.clone(), config);

    let stream = PageIterator::new(&*members, &mut gate, cancel)
        .with_margin(config.quota.pagination_margin)
        .into_stream();
    futures_util::pin_mut!(stream);

    let mut count = 0usize;
    while let Some(login) = stream.try_next().await? {
        match args.format {
            OutputFormat::Plain => println!("{}", login),
            OutputFormat::Json => println!("{}", serde_json::json!({ "login": login })),
        }
        count += 1;
    }

    info!("Listed {} members", count);
    Ok(())
}
