//! Challenge strategies and their selection.
//!
//! A [`Strategy`] is a processor-specific adapter that presents a challenge
//! in a host [`Container`] and reports the outcome through its concern's
//! event channel. Strategies are created by [`StrategyBuilder`]s once the
//! action profile has been fetched; the [`StrategySelector`] decides which
//! builder handles a given profile.
//!
//! # Selection
//!
//! Builders are consulted in registration order and the first whose
//! [`StrategyBuilder::matches`] accepts the profile wins. If none does, the
//! selector's fallback is used. The default selector has no builders and
//! falls back to [`ChallengeFrameBuilder`], so today every profile gets the
//! challenge-frame strategy.

mod challenge_frame;

pub use challenge_frame::*;

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::concern::{ConcernEvent, report_error};
use crate::error::RiskError;
use crate::event::EventChannel;
use crate::proto::{ActionProfile, TokenDetails};
use crate::session::Session;

/// Frame a strategy asks the host container to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFrame {
    /// Page the frame loads.
    pub url: Url,
    /// Frame width in CSS pixels.
    pub width: u32,
    /// Frame height in CSS pixels.
    pub height: u32,
    /// Action token the challenge belongs to.
    pub action_token: String,
}

/// Completion callback for a mounted frame.
///
/// Called at most once with the challenge results (or the failure the frame
/// reported). Its `Result` carries any failure raised while handling the
/// outcome back to the container.
pub type FrameCallback = Box<dyn FnOnce(Result<Value, RiskError>) -> Result<(), RiskError> + Send>;

/// Host-provided mount point for challenge UI.
pub trait Container: Send + Sync + Debug {
    /// Displays `frame` and arranges for `on_complete` to be called when the
    /// challenge finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be displayed.
    fn mount(&self, frame: ChallengeFrame, on_complete: FrameCallback) -> Result<(), RiskError>;

    /// Removes whatever [`Container::mount`] displayed.
    fn unmount(&self);
}

/// Processor-specific challenge adapter.
pub trait Strategy: Send + Sync + Debug {
    /// Returns the strategy name (e.g., `"challenge_frame"`).
    fn name(&self) -> &str;

    /// Mounts the challenge into `container` and starts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge cannot be started.
    fn attach(&self, container: Arc<dyn Container>) -> Result<(), RiskError>;

    /// Removes anything mounted by [`Strategy::attach`].
    fn remove(&self) {}
}

/// Creates strategies for the action profiles it recognizes.
pub trait StrategyBuilder: Send + Sync {
    /// Returns the name of the strategies this builder creates.
    fn name(&self) -> &str;

    /// Returns `true` if this builder should handle `profile`.
    fn matches(&self, profile: &ActionProfile) -> bool;

    /// Creates a strategy bound to `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile lacks what the strategy needs.
    fn build(
        &self,
        ctx: StrategyContext,
        profile: &ActionProfile,
    ) -> Result<Box<dyn Strategy>, RiskError>;
}

/// Builder matching a fixed gateway type.
///
/// Wraps another builder so it is only chosen for profiles whose
/// `gateway.type` equals `gateway`.
pub struct ForGateway<B> {
    gateway: String,
    inner: B,
}

impl<B> ForGateway<B> {
    /// Restricts `inner` to profiles issued by `gateway`.
    pub fn new(gateway: impl Into<String>, inner: B) -> Self {
        Self {
            gateway: gateway.into(),
            inner,
        }
    }
}

impl<B: Debug> Debug for ForGateway<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForGateway")
            .field("gateway", &self.gateway)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<B: StrategyBuilder> StrategyBuilder for ForGateway<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn matches(&self, profile: &ActionProfile) -> bool {
        profile.gateway_type() == Some(self.gateway.as_str())
    }

    fn build(
        &self,
        ctx: StrategyContext,
        profile: &ActionProfile,
    ) -> Result<Box<dyn Strategy>, RiskError> {
        self.inner.build(ctx, profile)
    }
}

/// Maps action profiles to strategy builders.
#[derive(Clone)]
pub struct StrategySelector {
    builders: Vec<Arc<dyn StrategyBuilder>>,
    fallback: Arc<dyn StrategyBuilder>,
}

impl Debug for StrategySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.builders.iter().map(|b| b.name()).collect();
        f.debug_struct("StrategySelector")
            .field("builders", &names)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(ChallengeFrameBuilder::default())
    }
}

impl StrategySelector {
    /// Creates a selector with no builders and the given fallback.
    pub fn new(fallback: impl StrategyBuilder + 'static) -> Self {
        Self {
            builders: Vec::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Registers a builder. Builders are consulted in registration order.
    #[must_use]
    pub fn with_strategy(mut self, builder: impl StrategyBuilder + 'static) -> Self {
        self.builders.push(Arc::new(builder));
        self
    }

    /// Picks the builder for `profile`.
    #[must_use]
    pub fn select(&self, profile: &ActionProfile) -> Arc<dyn StrategyBuilder> {
        let builder = self
            .builders
            .iter()
            .find(|b| b.matches(profile))
            .unwrap_or(&self.fallback);

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            gateway = profile.gateway_type().unwrap_or("-"),
            strategy = builder.name(),
            "risk.strategy.selected"
        );

        Arc::clone(builder)
    }

    /// Returns the names of the registered builders, fallback last.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.builders
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|b| b.name())
            .collect()
    }
}

/// What a strategy may use from its concern.
#[derive(Clone)]
pub struct StrategyContext {
    session: Session,
    action_token: String,
    events: EventChannel<ConcernEvent>,
}

impl Debug for StrategyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyContext")
            .field("action_token", &self.action_token)
            .finish_non_exhaustive()
    }
}

impl StrategyContext {
    /// Creates a context reporting through `events`.
    #[must_use]
    pub const fn new(
        session: Session,
        action_token: String,
        events: EventChannel<ConcernEvent>,
    ) -> Self {
        Self {
            session,
            action_token,
            events,
        }
    }

    /// Returns the session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the action token the concern was created for.
    #[must_use]
    pub fn action_token(&self) -> &str {
        &self.action_token
    }

    /// Emits a `token` event on the concern.
    pub fn token(&self, token: TokenDetails) {
        #[cfg(feature = "telemetry")]
        tracing::info!(token = %token.id, "risk.strategy.token");

        self.events.emit(&ConcernEvent::Token(token));
    }

    /// Emits an `error` event on the concern and returns the error.
    ///
    /// # Errors
    ///
    /// Always returns `Err(err)`.
    pub fn error<T>(&self, err: RiskError) -> Result<T, RiskError> {
        report_error(&self.events, err)
    }
}
