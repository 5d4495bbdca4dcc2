use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Query for {target} failed after {attempts} attempt(s): {reason}")]
    QueryFailed {
        target: String,
        attempts: u32,
        reason: String,
    },
    #[error("Endpoint answered with HTTP {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("House number prefix for street '{0}' must not be empty")]
    EmptyNumberPrefix(String),
    #[error("Crawl incomplete, {} subtree(s) failed: {}", .failed.len(), .failed.join(", "))]
    Incomplete { failed: Vec<String> },

    #[error("Checkpoint schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// Whether a failed request is worth repeating.
    ///
    /// Timeouts, dropped connections, 5xx and 429 are transient. Other 4xx answers
    /// and everything local are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::HttpStatus(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Error::Reqwest(err) => match err.status() {
                Some(status) => {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                }
                None => err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
            },
            _ => false,
        }
    }
}
