//! Unified error type.

use http::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::response::ResponseContext;

/// The error type returned by abdera's fallible operations.
///
/// Most application-level outcomes (404, 405, 412 ...) are expressed as
/// [`ResponseContext`] values. An adapter that wants to abort with a finished
/// response returns [`Error::Response`]; the provider unwraps it and sends
/// the embedded response unchanged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("invalid `{name}` header: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("{} {}", .0.status().as_u16(), .0.status_text().unwrap_or_default())]
    Response(Box<ResponseContext>),

    #[error("adapter: {0}")]
    Adapter(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Abort processing with a prebuilt response.
    pub fn response(response: ResponseContext) -> Self {
        Self::Response(Box::new(response))
    }

    /// Abort processing with a standard error document for `status`.
    pub fn http(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::response(crate::helper::error_response(status, reason))
    }

    /// Wrap an arbitrary adapter failure. It is reported as a 500.
    pub fn adapter(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Adapter(err.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Response(response) => response.status(),
            Self::InvalidHeader { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
