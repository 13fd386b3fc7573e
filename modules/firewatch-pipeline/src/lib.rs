pub mod cache;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod retention;
pub mod scheduler;
pub mod snapshot;
pub mod spatial_filter;
pub mod stats;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{CacheUpdate, EventCache, SharedCache};
pub use error::PipelineError;
pub use ingest::IngestionPipeline;
pub use notify::{Alert, NotificationFanout};
pub use retention::RetentionSweeper;
pub use scheduler::Scheduler;
pub use snapshot::FileSnapshotStore;
pub use stats::{FanoutStats, IngestStats, SweepStats};
