//! HTTP transport for the checkout risk orchestration core.
//!
//! Provides [`HttpTransport`], a `reqwest`-backed implementation of
//! [`checkout_risk::Transport`] that runs requests on a tokio runtime.
//!
//! # Modules
//!
//! - [`transport`] - The transport and its configuration
//! - [`error`] - HTTP transport error types

pub mod error;
pub mod transport;

pub use error::HttpTransportError;
pub use transport::{HttpTransport, HttpTransportConfig};
