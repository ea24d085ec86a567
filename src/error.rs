//! Error types for amtctl

use thiserror::Error;

/// Result type alias for amtctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Amt(#[from] AmtError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the AMT protocol layer.
///
/// `Transport` covers connect/timeout/TLS failures and is terminal per
/// attempt; callers report it as HTTP status 0 and AMT code 16.
#[derive(Debug, Error)]
pub enum AmtError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server sent 401 without a WWW-Authenticate header")]
    AuthChallengeMissing,

    #[error("Unparsable WWW-Authenticate challenge: {0}")]
    AuthChallengeMalformed(String),

    #[error("Unknown AMT command: {0}")]
    UnknownCommand(String),
}

impl From<reqwest::Error> for AmtError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AmtError::Transport("request timed out".to_string())
        } else if err.is_connect() {
            AmtError::Transport(format!("connect failed: {}", err))
        } else {
            AmtError::Transport(err.to_string())
        }
    }
}

/// Configuration-related errors, all fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse CA certificate: {0}")]
    InvalidCaCert(String),

    #[error("Cannot read CA certificate file {path}: {source}")]
    CaCertFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot read password file {path}: {source}")]
    PasswordFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
