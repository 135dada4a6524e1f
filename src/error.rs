use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid report request: {0}")]
    InvalidRequest(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("authorization error: credential file {} is unusable ({reason}); delete it to re-authorize", .path.display())]
    CredentialFile { path: PathBuf, reason: String },

    #[error("remote service error: {0}")]
    Remote(String),

    #[error("remote service error: {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("report data error: {0}")]
    DataShape(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Classifies a transport failure against the token endpoint.
    pub fn authorization_transport(operation: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout { operation }
        } else {
            AppError::Authorization(format!("{operation} request failed: {err}"))
        }
    }

    /// Classifies a transport failure against the reporting API.
    pub fn remote_transport(operation: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout { operation }
        } else {
            AppError::Remote(format!("{operation} request failed: {err}"))
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
