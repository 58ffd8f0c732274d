//! Checkout session and the transport boundary.
//!
//! A [`Session`] is the shared, read-only handle every concern reaches
//! through its controller. It pairs the [`SessionConfig`] with a
//! [`Transport`], the external collaborator that actually talks to the API.
//!
//! Transports follow an error-first callback convention: the callback passed
//! to [`Transport::request`] is invoked exactly once with either the decoded
//! JSON payload or a [`TransportError`]. It may run synchronously, inside
//! `request`, or later from whatever drives the I/O.

use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::{RiskError, TransportError};

/// HTTP method of a transport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A request issued through a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// Request method.
    pub method: Method,
    /// Path relative to the API base URL (e.g., `"/token/abc"`).
    pub path: String,
    /// Optional JSON body (`POST`) or query parameters (`GET`).
    pub body: Option<Value>,
}

impl TransportRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Creates a `POST` request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

impl Display for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Completion callback for a transport request.
///
/// The callback's own `Result` is handed back to whoever completes the
/// request, so failures raised while handling a response are observable at
/// the completion site.
pub type TransportCallback =
    Box<dyn FnOnce(Result<Value, TransportError>) -> Result<(), RiskError> + Send>;

/// Performs requests against the remote API.
///
/// Implementations must invoke `callback` exactly once. When the callback
/// runs synchronously, `request` returns its result; otherwise `request`
/// returns `Ok(())` and the implementation is responsible for reporting the
/// callback's result (typically by logging it).
pub trait Transport: Send + Sync {
    /// Issues `request` and reports its outcome to `callback`.
    ///
    /// # Errors
    ///
    /// Returns the callback's error when the request completed synchronously.
    fn request(&self, request: TransportRequest, callback: TransportCallback)
    -> Result<(), RiskError>;
}

/// Shared handle to one checkout session.
///
/// Cloning is cheap; all clones see the same configuration and transport.
#[derive(Clone)]
pub struct Session {
    config: Arc<SessionConfig>,
    transport: Arc<dyn Transport>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session from its configuration and transport.
    pub fn new(config: SessionConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
        }
    }

    /// Creates a session sharing an existing transport.
    #[must_use]
    pub fn with_shared_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issues a request through the session transport.
    ///
    /// # Errors
    ///
    /// Propagates the callback's error when the transport completes
    /// synchronously.
    pub fn request<F>(&self, request: TransportRequest, callback: F) -> Result<(), RiskError>
    where
        F: FnOnce(Result<Value, TransportError>) -> Result<(), RiskError> + Send + 'static,
    {
        #[cfg(feature = "telemetry")]
        tracing::debug!(request = %request, "risk.session.request");

        self.transport.request(request, Box::new(callback))
    }
}
