// Error types shared by the store backends, configuration and HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the data service
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "rest")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("could not decode data service payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("store connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Startup configuration problems; always fatal
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("unsupported data service url: {url}")]
    UnsupportedUrl { url: String },
}

/// Errors surfaced to HTTP callers as `{ "error": message }`
#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected input, nothing was written
    #[error("{0}")]
    BadRequest(String),

    /// Generic caller-facing message; details go to the log only
    #[error("{0}")]
    Internal(&'static str),

    /// Body could not be read (too large, connection dropped); keeps the
    /// extractor's own status and text
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
