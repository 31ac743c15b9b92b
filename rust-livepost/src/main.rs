use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rust_livepost::cache::{DedupDenylist, LiveCache};
use rust_livepost::config::AppConfig;
use rust_livepost::database::{self, repositories::SqlxVideoRepository};
use rust_livepost::domain::PriorityPolicy;
use rust_livepost::ingest::{DuplicateResolver, FeedSource, Ingestor};
use rust_livepost::logging;
use rust_livepost::monitor::{DetailFetcher, ListenerRegistry, Poller};
use rust_livepost::niconico::NiconicoUserFeed;
use rust_livepost::notification::{AutoPoster, build_sinks};
use rust_livepost::scheduler::{PollingService, PrefetchScheduler, SnapshotRefresher};
use rust_livepost::store::Store;
use rust_livepost::utils::system_clock;
use rust_livepost::youtube::{DataApiClient, DataApiConfig, YoutubeChannelFeed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;

    let (logging, _log_guard) = logging::init_logging(&config.log_dir)?;
    if let Some(filter) = &config.log_filter
        && let Err(e) = logging.set_filter(filter)
    {
        warn!(error = %e, "Ignoring LOG_FILTER");
    }
    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.child_token());
    config.log_startup();

    let pool = database::connect(&config.db_settings())
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;

    let clock = system_clock();
    let live_cache = Arc::new(LiveCache::load(
        config.live_cache_path(),
        config.cache_ttl,
        clock.clone(),
    ));
    let denylist = Arc::new(DedupDenylist::load(config.denylist_path()));
    let store = Arc::new(Store::new(
        Arc::new(SqlxVideoRepository::new(pool.clone())),
        live_cache,
        clock.clone(),
    ));

    let listeners = Arc::new(ListenerRegistry::new());
    let sinks = build_sinks(config.sink_configs())?;
    Arc::new(AutoPoster::new(
        store.clone(),
        sinks,
        config.templates.clone(),
        config.autopost_mode,
    ))
    .register(&listeners);

    let fetcher = match &config.youtube_api_key {
        Some(key) => {
            let client: Arc<dyn DetailFetcher> = Arc::new(DataApiClient::new(DataApiConfig::new(key))?);
            Some(client)
        }
        None => None,
    };

    let mut poller = Poller::new(store.clone(), fetcher.clone(), listeners.clone(), clock.clone());
    let mut resolver = DuplicateResolver::new(
        store.clone(),
        denylist.clone(),
        PriorityPolicy::with_premiere_window(config.premiere_window),
        clock.clone(),
    );
    let prefetch = fetcher.map(|fetcher| {
        Arc::new(PrefetchScheduler::new(
            Arc::new(SnapshotRefresher::new(fetcher, store.clone())),
            config.prefetch,
            clock.clone(),
        ))
    });
    if let Some(prefetch) = &prefetch {
        poller = poller.with_prefetch(prefetch.clone());
        resolver = resolver.with_prefetch(prefetch.clone());
    }

    let ingestor = Ingestor::new(store.clone(), denylist, listeners, clock);

    let mut feeds: Vec<Arc<dyn FeedSource>> = Vec::new();
    for channel_id in &config.youtube_channel_ids {
        feeds.push(Arc::new(YoutubeChannelFeed::new(channel_id)?));
    }
    for user_id in &config.niconico_user_ids {
        feeds.push(Arc::new(NiconicoUserFeed::new(user_id)?));
    }
    if feeds.is_empty() {
        warn!("No feeds configured (YOUTUBE_CHANNEL_IDS / NICONICO_USER_IDS)");
    }

    let service = PollingService::new(
        config.poll_interval,
        feeds,
        Arc::new(ingestor),
        Arc::new(resolver),
        Arc::new(poller),
    );

    let run_token = shutdown.clone();
    let service_task = tokio::spawn(async move { service.run(run_token).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    if let Some(prefetch) = &prefetch {
        prefetch.shutdown();
    }
    if let Err(e) = service_task.await {
        warn!(error = %e, "Polling service task failed");
    }
    pool.close().await;

    info!("rust-livepost stopped");
    Ok(())
}
