use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fcm_client::FcmClient;
use firewatch_common::Config;
use firewatch_pipeline::traits::FirmsFeed;
use firewatch_pipeline::{
    EventCache, FileSnapshotStore, IngestionPipeline, NotificationFanout, RetentionSweeper,
    Scheduler,
};
use firewatch_store::FireStore;
use firms_client::{CountryQuery, FirmsClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("firewatch=info".parse()?)
                .add_directive("firms_client=info".parse()?)
                .add_directive("fcm_client=info".parse()?),
        )
        .init();

    info!("Firewatch starting...");

    // Load config
    let config = Config::from_env()?;
    config.log_redacted();

    // Connect to Postgres
    let store = Arc::new(FireStore::connect(&config.database_url).await?);

    // Run migrations (idempotent)
    store.migrate().await?;

    // Load the cache snapshot, then reconcile with the store
    let snapshots = FileSnapshotStore::new(config.cache_snapshot_path.clone());
    let mut cache = EventCache::load(Box::new(snapshots))?;
    let persisted = store.scan_all().await?;
    cache.refresh_from_store(persisted)?;
    info!(events = cache.len(), "Cache ready");
    let cache = cache.into_shared();

    // FIRMS feed
    let firms = FirmsClient::new(config.firms_map_key.clone(), config.feed_timeout)?;
    let query = CountryQuery::new(
        config.firms_source.clone(),
        config.firms_country.clone(),
        config.firms_day_range,
    );
    let feed = Arc::new(FirmsFeed::new(firms, query));

    let mut pipeline =
        IngestionPipeline::new(feed, store.clone(), cache.clone(), config.filter_policy);

    match &config.notify {
        Some(notify) => {
            let transport = Arc::new(FcmClient::new(
                notify.fcm_project_id.clone(),
                notify.fcm_access_token.clone(),
                notify.send_timeout,
            )?);
            let fanout = NotificationFanout::new(store.clone(), transport)
                .with_alert_radius(notify.alert_radius_m)
                .with_max_concurrent_sends(notify.max_concurrent_sends);
            pipeline = pipeline.with_fanout(Arc::new(fanout));
            info!(radius_m = notify.alert_radius_m, "Notifications enabled");
        }
        None => warn!("Notifications disabled"),
    }

    let sweeper = RetentionSweeper::new(store.clone(), cache, config.retention_policy);

    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        Arc::new(sweeper),
        config.ingest_interval,
        config.sweep_interval,
    );

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Firewatch stopped");
    Ok(())
}
