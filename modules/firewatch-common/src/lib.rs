pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{Config, NotifyConfig};
pub use error::{CacheError, ConfigError, DeliveryError, FetchError, RecordError, StoreError};
pub use policy::{ExpiryCutoff, FilterPolicy, RetentionPolicy};
pub use types::*;
