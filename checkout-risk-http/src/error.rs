//! Error types for the HTTP transport.
//!
//! [`HttpTransportError`] keeps the full `reqwest` context for logging.
//! Concerns only ever see the core [`TransportError`] it converts into.

use checkout_risk::{TransportError, TransportErrorKind};
use http::StatusCode;
use serde_json::Value;
use url::Url;

/// Errors that can occur while talking to the API over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    /// The API base URL cannot carry a path.
    #[error("Invalid API base URL: {url}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: Url,
    },
    /// No tokio runtime to run requests on.
    #[error("No tokio runtime available: {source}")]
    Runtime {
        /// The underlying runtime lookup error.
        #[source]
        source: tokio::runtime::TryCurrentError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Request line, e.g. `GET /token/abc`.
        context: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Request line, e.g. `GET /token/abc`.
        context: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Request line, e.g. `GET /token/abc`.
        context: String,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// The API answered with an error document.
    #[error("API error [{code}]: {context}: {message}")]
    Api {
        /// Request line, e.g. `GET /token/abc`.
        context: String,
        /// API error code, e.g. `not-found`.
        code: String,
        /// API error message.
        message: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Request line, e.g. `GET /token/abc`.
        context: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// An `{"error": {"code", "message"}}` document.
pub(crate) struct ApiErrorBody {
    pub(crate) code: String,
    pub(crate) message: String,
}

impl ApiErrorBody {
    /// Extracts the API error from a response document, if it is one.
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let error = value.get("error")?.as_object()?;
        let code = error.get("code").and_then(Value::as_str).unwrap_or("unknown");
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("API error");
        Some(Self {
            code: code.to_owned(),
            message: message.to_owned(),
        })
    }

    fn from_text(body: &str) -> Option<Self> {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| Self::from_value(&value))
    }
}

impl From<HttpTransportError> for TransportError {
    fn from(err: HttpTransportError) -> Self {
        match err {
            HttpTransportError::HttpStatus { status, body, .. } => {
                match ApiErrorBody::from_text(&body) {
                    Some(api) => Self::new(TransportErrorKind::Status, api.message)
                        .with_code(api.code)
                        .with_status(status.as_u16()),
                    None => Self::new(
                        TransportErrorKind::Status,
                        status.canonical_reason().unwrap_or("unexpected status"),
                    )
                    .with_status(status.as_u16()),
                }
            }
            HttpTransportError::Api { code, message, .. } => Self::api(code, message),
            err @ HttpTransportError::JsonDeserialization { .. } => {
                Self::new(TransportErrorKind::Decode, err.to_string())
            }
            err @ (HttpTransportError::InvalidBaseUrl { .. }
            | HttpTransportError::Runtime { .. }
            | HttpTransportError::Http { .. }
            | HttpTransportError::ResponseBodyRead { .. }) => Self::network(err.to_string()),
        }
    }
}
