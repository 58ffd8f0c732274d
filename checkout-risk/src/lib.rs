#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Risk-concern orchestration for hosted checkout sessions.
//!
//! A checkout session may need extra risk-mitigation steps before a payment
//! can complete, most commonly a 3-D Secure challenge. This crate models each
//! such step as a *concern*, keeps the active concerns of a session in a
//! [`RiskController`], and lets each concern present its challenge through a
//! processor-specific *strategy*.
//!
//! The crate is transport-agnostic: API calls go through the
//! [`Transport`](session::Transport) trait. `checkout-risk-http` provides a
//! `reqwest` implementation.
//!
//! # Modules
//!
//! - [`controller`] - Per-session registry of concerns and the concern factories
//! - [`concern`] - The concern capability, lifecycle state, and events
//! - [`three_d_secure`] - The 3-D Secure concern
//! - [`strategy`] - Challenge strategies, host containers, and strategy selection
//! - [`event`] - Typed synchronous publish/subscribe channel
//! - [`session`] - Session handle and the transport boundary
//! - [`config`] - Session configuration
//! - [`proto`] - Wire types exchanged with the API
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use checkout_risk::{RiskController, Session, SessionConfig, ThreeDSecureOptions};
//! use checkout_risk::concern::{Concern, ConcernEvent, ConcernEventKind};
//!
//! let session = Session::new(SessionConfig::new("ewr1-..."), transport);
//! let controller = RiskController::new(session);
//!
//! let concern = controller.three_d_secure(ThreeDSecureOptions::new(action_token))?;
//! concern.events().on(ConcernEventKind::Token, |event| {
//!     if let ConcernEvent::Token(token) = event {
//!         submit_to_backend(&token.id);
//!     }
//! });
//! concern.attach(container)?;
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod concern;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod proto;
pub mod session;
pub mod strategy;
pub mod three_d_secure;

#[cfg(test)]
mod testing;

pub use concern::{Concern, ConcernEvent, ConcernEventKind, ConcernState};
pub use config::SessionConfig;
pub use controller::{ConcernId, RiskController};
pub use error::{RiskError, TransportError, TransportErrorKind};
pub use session::{Session, Transport, TransportRequest};
pub use three_d_secure::{ThreeDSecure, ThreeDSecureOptions};
