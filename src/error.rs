use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid encryption key: {0}")]
    Key(String),

    #[error("Metric store error: {0}")]
    Store(#[from] prometheus::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("HTTP server error: {0}")]
    Http(#[from] hyper::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Reasons an ingest request is refused.
///
/// The `Display` text carries the internal cause and is only ever logged.
/// Callers see [`IngestError::client_message`], which is deliberately generic.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("request body of {size} bytes reaches the {limit} byte cap")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("decryption failed: {0}")]
    Security(String),

    #[error("malformed payload: {0}")]
    Format(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Body(_)
            | IngestError::Security(_)
            | IngestError::Format(_)
            | IngestError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            IngestError::MethodNotAllowed(_) => "only POST is supported",
            IngestError::PayloadTooLarge { .. } => "request body too large",
            IngestError::Body(_) => "failed to read request body",
            IngestError::Security(_) => "payload decryption failed",
            IngestError::Format(_) => "malformed payload",
            IngestError::Validation(_) => "invalid payload",
        }
    }

    /// Short label used for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MethodNotAllowed(_) => "method",
            IngestError::PayloadTooLarge { .. } => "too_large",
            IngestError::Body(_) => "body",
            IngestError::Security(_) => "security",
            IngestError::Format(_) => "format",
            IngestError::Validation(_) => "validation",
        }
    }
}
