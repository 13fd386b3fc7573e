use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::ingest::IngestionPipeline;
use crate::retention::RetentionSweeper;

/// `tokio::time::interval` rejects a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs ingestion and retention on independent fixed cadences.
///
/// Both loops tick once immediately. A failed run is logged and the next tick
/// retries; there is no backoff. Shutdown waits for any in-flight run to
/// finish instead of cancelling it.
pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    sweeper: Arc<RetentionSweeper>,
    ingest_every: Duration,
    sweep_every: Duration,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        sweeper: Arc<RetentionSweeper>,
        ingest_every: Duration,
        sweep_every: Duration,
    ) -> Self {
        Self {
            pipeline,
            sweeper,
            ingest_every,
            sweep_every,
        }
    }

    /// Run both loops until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);

        let pipeline = self.pipeline.clone();
        let ingest = spawn_loop("ingest", self.ingest_every, stop_rx.clone(), move || {
            let pipeline = pipeline.clone();
            async move {
                match pipeline.run().await {
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Ingestion run failed"),
                }
            }
        });

        let sweeper = self.sweeper.clone();
        let sweep = spawn_loop("retention", self.sweep_every, stop_rx, move || {
            let sweeper = sweeper.clone();
            async move {
                match sweeper.run().await {
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Retention sweep failed"),
                }
            }
        });

        shutdown.await;
        info!("Shutdown requested, waiting for in-flight runs");
        let _ = stop_tx.send(true);

        for (name, handle) in [("ingest", ingest), ("retention", sweep)] {
            if let Err(e) = handle.await {
                error!(job = name, error = %e, "Job loop panicked");
            }
        }
        info!("Scheduler stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    every: Duration,
    mut stop: watch::Receiver<bool>,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, every_secs = every.as_secs(), "Job loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }
        }
    })
}
