//! The framework error taxonomy.
//!
//! Every failure a handler, middleware, or framework component can surface is
//! one of these kinds; each maps to exactly one HTTP status. Handlers return
//! `Result<(), Error>` and the outermost dispatch wrapper renders whatever
//! bubbles up.

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("binding {field}: {reason}")]
    Bind { field: String, reason: String },

    #[error("validation failed on {field}: {message}")]
    Validation { field: String, rule: &'static str, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("authorization failed: {0}")]
    Claims(String),

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("no renderer configured")]
    NoRenderer,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Handler(String),
}

impl Error {
    pub fn bind(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Bind { field: field.into(), reason: reason.into() }
    }

    pub fn validation(
        field: impl Into<String>,
        rule: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation { field: field.into(), rule, message: message.into() }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// The status this error renders with. Validation errors consult the
    /// engine-configured status (400 by default, 422 opt-in), passed in by
    /// the dispatcher.
    pub fn status(&self, validation_status: StatusCode) -> StatusCode {
        match self {
            Error::Bind { .. } => StatusCode::BAD_REQUEST,
            Error::Validation { .. } => validation_status,
            Error::Auth(_) | Error::Claims(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::NoRenderer | Error::Config(_) | Error::Encode(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body written by [`crate::Context::abort_with_error`] and by the dispatcher
/// for errors that escape a handler.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code: code.as_u16(), message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
