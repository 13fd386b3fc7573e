use thiserror::Error;

use firewatch_common::{FetchError, StoreError};

/// Why a scheduled run stopped early. The cache is untouched in every case.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}
