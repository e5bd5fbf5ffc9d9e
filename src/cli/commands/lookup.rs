//! Lookup command - read records through the cache or the live API

use super::{github_client, open_store};
use crate::cache::{CacheBackedLookup, KeyValueCache, Payload, StalenessPolicy};
use crate::cli::args::LookupArgs;
use crate::config::{CacheKind, CacheSettings, Config};
use crate::error::HarvestResult;
use crate::payload::{ActivityPayload, ProfilePayload};
use crate::quota::QuotaState;
use crate::remote::RecordSource;
use tracing::info;

/// Execute the lookup command
pub async fn execute(args: LookupArgs, config: &Config) -> HarvestResult<()> {
    let settings = config.cache(args.cache);
    let live = args.live || !settings.enabled;

    match args.cache {
        CacheKind::Activity => {
            run::<ActivityPayload>(&args.keys, live, &settings, config).await
        }
        CacheKind::Profile => run::<ProfilePayload>(&args.keys, live, &settings, config).await,
    }
}

async fn run<P: Payload>(
    keys: &[String],
    live: bool,
    settings: &CacheSettings,
    config: &Config,
) -> HarvestResult<()>
where
    crate::remote::GithubClient: RecordSource<P>,
{
    if live {
        let client = github_client(config)?;
        let mut quota = QuotaState::new(settings.assumed_remaining, settings.safety_floor);
        let mut lookup = CacheBackedLookup::<P>::live(&client, &mut quota);
        print_all(&mut lookup, keys).await?;
        info!("Live lookups finished with {} calls remaining", quota.remaining);
        return Ok(());
    }

    let store = open_store(config).await?;
    let cache = KeyValueCache::<P>::new(store, settings.table.clone());
    let records = cache.list_all().await?;
    let mut lookup =
        CacheBackedLookup::cached(&records, StalenessPolicy::new(settings.freshness_days));
    print_all(&mut lookup, keys).await
}

async fn print_all<P: Payload>(
    lookup: &mut CacheBackedLookup<'_, P>,
    keys: &[String],
) -> HarvestResult<()> {
    for key in keys {
        let payload = lookup.get(key).await;
        let line = serde_json::json!({ "key": key, "payload": payload });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}
