use thiserror::Error;

pub type Result<T> = std::result::Result<T, FirmsError>;

#[derive(Debug, Error)]
pub enum FirmsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FirmsError {
    fn from(err: reqwest::Error) -> Self {
        FirmsError::Network(err.to_string())
    }
}

impl From<csv::Error> for FirmsError {
    fn from(err: csv::Error) -> Self {
        FirmsError::Parse(err.to_string())
    }
}
