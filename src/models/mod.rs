pub mod record;
pub mod outcome;

pub use record::*;
pub use outcome::*;

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: status={status} body={body}")]
    Api { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TargetError {
    /// 429 and 5xx responses are worth another attempt; other statuses are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            TargetError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            TargetError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TargetError>;
