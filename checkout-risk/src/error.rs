//! Error types for risk concern orchestration.
//!
//! Every error here is `Clone` because it travels twice: once inside the
//! concern's `error` event and once back to the caller that triggered it.

use std::fmt;

/// Base error type for risk concern operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskError {
    /// The transport failed to perform a request.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// A required option was missing or malformed.
    #[error("invalid option '{name}': expected {expect}")]
    InvalidOption {
        /// Option name (e.g., `"action_token"`).
        name: &'static str,
        /// What the option should have been.
        expect: &'static str,
    },

    /// A response payload could not be interpreted.
    #[error("failed to decode {context}: {message}")]
    Decode {
        /// What was being decoded (e.g., `"action profile"`).
        context: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The challenge UI reported a failure.
    #[error("challenge failed: {reason}: {message}")]
    Challenge {
        /// Machine-readable reason (e.g., `"frame_closed"`).
        reason: String,
        /// Human-readable message.
        message: String,
    },

    /// The owning controller has been dropped.
    #[error("risk controller is no longer available")]
    ControllerGone,
}

impl RiskError {
    /// Creates a challenge failure.
    #[must_use]
    pub fn challenge(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Challenge {
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Creates a decode failure from a serde error.
    #[must_use]
    pub fn decode(context: &'static str, err: &serde_json::Error) -> Self {
        Self::Decode {
            context,
            message: err.to_string(),
        }
    }
}

/// Category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request never produced a response (connect, timeout, DNS).
    Network,
    /// The server answered with a non-success status.
    Status,
    /// The response body was not valid JSON.
    Decode,
    /// The server answered with an error-shaped payload.
    Api,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::Api => "api",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`Transport`](crate::session::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Failure category.
    pub kind: TransportErrorKind,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code (if a response was received).
    pub status: Option<u16>,
    /// API error code (for [`TransportErrorKind::Api`]).
    pub code: Option<String>,
}

impl TransportError {
    /// Creates a new transport error.
    #[must_use]
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
        }
    }

    /// Creates a network-level error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Creates an API error from an error-shaped payload.
    #[must_use]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Api, message).with_code(code)
    }

    /// Sets the HTTP status code.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the API error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for TransportError {}
