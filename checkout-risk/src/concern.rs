//! The concern capability and its shared lifecycle.
//!
//! A concern is one unit of risk-mitigation behavior attached to a checkout
//! session. Every concern embeds a [`ConcernCore`], which carries the pieces
//! all concerns share: the controller handle, the event channel, the
//! lifecycle state, and the destroyed flag. The [`Concern`] trait exposes
//! them and supplies the default `attach`/`remove` hooks and `destroy`.
//!
//! # Lifecycle
//!
//! ```text
//! Constructed -> FetchingMetadata -> Ready
//!                                 \-> Errored
//! ```
//!
//! `Ready` and `Errored` are terminal. Destruction is tracked separately and
//! does not change the state: a fetch that completes after `destroy()` still
//! moves the state forward, but its events are dropped.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::controller::{ConcernId, ControllerHandle};
use crate::error::RiskError;
use crate::event::{Event, EventChannel};
use crate::proto::TokenDetails;
use crate::session::Session;
use crate::strategy::Container;

/// Lifecycle state of a concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcernState {
    /// Created, no request issued yet.
    Constructed,
    /// Waiting for the action profile.
    FetchingMetadata,
    /// Metadata fetched; `attach` runs immediately.
    Ready,
    /// Metadata fetch failed; deferred attaches never run.
    Errored,
}

impl ConcernState {
    /// Returns `true` for `Ready` and `Errored`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Errored)
    }
}

/// Variant tag of a concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcernKind {
    /// 3-D Secure challenge.
    ThreeDSecure,
    /// Host-defined concern.
    Custom(&'static str),
}

impl Display for ConcernKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreeDSecure => f.write_str("three_d_secure"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Events surfaced to host code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcernEvent {
    /// Metadata fetched; attaching is now immediate.
    Ready,
    /// The challenge completed and produced a token.
    Token(TokenDetails),
    /// A failure; the same error is also returned to the triggering caller.
    Error(RiskError),
}

/// Discriminant of a [`ConcernEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcernEventKind {
    /// [`ConcernEvent::Ready`]
    Ready,
    /// [`ConcernEvent::Token`]
    Token,
    /// [`ConcernEvent::Error`]
    Error,
}

impl Event for ConcernEvent {
    type Kind = ConcernEventKind;

    fn kind(&self) -> ConcernEventKind {
        match self {
            Self::Ready => ConcernEventKind::Ready,
            Self::Token(_) => ConcernEventKind::Token,
            Self::Error(_) => ConcernEventKind::Error,
        }
    }
}

/// Emits `err` on `events` and hands it back as `Err`.
///
/// # Errors
///
/// Always returns `Err(err)`.
pub fn report_error<T>(events: &EventChannel<ConcernEvent>, err: RiskError) -> Result<T, RiskError> {
    #[cfg(feature = "telemetry")]
    tracing::warn!(error = %err, "risk.concern.error");

    events.emit(&ConcernEvent::Error(err.clone()));
    Err(err)
}

/// Outcome of [`ConcernCore::when_ready`].
#[derive(Debug)]
pub enum Readiness<F> {
    /// The concern is ready; the caller gets its closure back to run now.
    Ready(F),
    /// The closure will run on the next `ready` event.
    Deferred,
}

/// State shared by every concern.
pub struct ConcernCore {
    handle: ControllerHandle,
    events: EventChannel<ConcernEvent>,
    state: Mutex<ConcernState>,
    destroyed: AtomicBool,
}

impl Debug for ConcernCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcernCore")
            .field("id", &self.handle.id())
            .field("state", &self.state())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl ConcernCore {
    /// Creates the core for a concern owned by `handle`'s controller.
    #[must_use]
    pub fn new(handle: ControllerHandle) -> Self {
        Self {
            handle,
            events: EventChannel::new(),
            state: Mutex::new(ConcernState::Constructed),
            destroyed: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConcernState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the controller handle.
    #[must_use]
    pub const fn handle(&self) -> &ControllerHandle {
        &self.handle
    }

    /// Returns the event channel.
    #[must_use]
    pub const fn events(&self) -> &EventChannel<ConcernEvent> {
        &self.events
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConcernState {
        *self.lock_state()
    }

    /// Moves to `next` unless the current state is terminal. Returns `true`
    /// if the state changed.
    fn transition(&self, next: ConcernState) -> bool {
        let mut state = self.lock_state();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    /// Moves from `Constructed` to `FetchingMetadata`. Returns `false` if the
    /// metadata fetch was already started or finished.
    pub fn begin_fetch(&self) -> bool {
        let mut state = self.lock_state();
        if *state != ConcernState::Constructed {
            return false;
        }
        *state = ConcernState::FetchingMetadata;
        true
    }

    /// Marks the concern ready and emits `ready`.
    ///
    /// Only the first transition into a terminal state counts: once the
    /// concern is `Ready` or `Errored` this does nothing and returns `false`.
    pub fn mark_ready(&self) -> bool {
        if !self.transition(ConcernState::Ready) {
            return false;
        }
        self.events.emit(&ConcernEvent::Ready);
        true
    }

    /// Marks the concern errored, emits `error`, and returns the error.
    ///
    /// A concern that is already `Ready` or `Errored` keeps its state; the
    /// error is still emitted and returned.
    ///
    /// # Errors
    ///
    /// Always returns `Err(err)`.
    pub fn fail<T>(&self, err: RiskError) -> Result<T, RiskError> {
        self.transition(ConcernState::Errored);
        self.error(err)
    }

    /// Emits `err` as an `error` event and returns it.
    ///
    /// # Errors
    ///
    /// Always returns `Err(err)`.
    pub fn error<T>(&self, err: RiskError) -> Result<T, RiskError> {
        report_error(&self.events, err)
    }

    /// Returns `f` to run now if the concern is ready, otherwise schedules it
    /// on the next `ready` event.
    ///
    /// The readiness check and the subscription happen under the state lock,
    /// so a transition racing with this call is never missed. A deferred `f`
    /// has no caller to return to; it must report its own failures.
    pub fn when_ready<F>(&self, f: F) -> Readiness<F>
    where
        F: FnOnce() -> Result<(), RiskError> + Send + 'static,
    {
        let state = self.lock_state();
        if *state == ConcernState::Ready {
            return Readiness::Ready(f);
        }
        self.events.once(ConcernEventKind::Ready, move |_| {
            let _ = f();
        });
        drop(state);
        Readiness::Deferred
    }

    /// Returns `true` once the concern has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Flags the concern destroyed. Returns `false` if it already was.
    fn begin_destroy(&self) -> bool {
        !self.destroyed.swap(true, Ordering::AcqRel)
    }

    /// Unregisters from the controller and closes the event channel.
    fn finish_destroy(&self) {
        // Already unregistered when the controller tore itself down.
        let _ = self.handle.unregister();
        self.events.close();

        #[cfg(feature = "telemetry")]
        tracing::debug!(concern = %self.handle.id(), "risk.concern.destroyed");
    }
}

/// Capability interface implemented by every concern.
///
/// Implementors provide [`Concern::core`] and [`Concern::kind`]; the rest has
/// default implementations. Concerns with a visual component override
/// [`Concern::attach`] and [`Concern::remove`].
///
/// Operations on a destroyed concern are not guarded: they behave as they
/// would on a live one, except that the closed event channel no longer
/// delivers anything.
pub trait Concern: Send + Sync + Debug {
    /// Returns the shared lifecycle state.
    fn core(&self) -> &ConcernCore;

    /// Returns the variant tag.
    fn kind(&self) -> ConcernKind;

    /// Returns the concern's identity.
    fn id(&self) -> ConcernId {
        self.core().handle().id()
    }

    /// Returns the current lifecycle state.
    fn state(&self) -> ConcernState {
        self.core().state()
    }

    /// Returns `true` once metadata has been fetched.
    fn is_ready(&self) -> bool {
        self.state() == ConcernState::Ready
    }

    /// Returns `true` once [`Concern::destroy`] has run.
    fn is_destroyed(&self) -> bool {
        self.core().is_destroyed()
    }

    /// Returns the event channel hosts subscribe to.
    fn events(&self) -> &EventChannel<ConcernEvent> {
        self.core().events()
    }

    /// Returns the session, reached through the controller.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ControllerGone`] if the controller was dropped.
    fn session(&self) -> Result<Session, RiskError> {
        self.core().handle().session()
    }

    /// Emits `err` as an `error` event, then returns it to the caller.
    ///
    /// # Errors
    ///
    /// Always returns `Err(err)`.
    fn error(&self, err: RiskError) -> Result<(), RiskError> {
        self.core().error(err)
    }

    /// Mounts the concern's UI into `container`. No-op by default.
    ///
    /// # Errors
    ///
    /// Implementations return mount failures after emitting them.
    fn attach(&self, _container: Arc<dyn Container>) -> Result<(), RiskError> {
        Ok(())
    }

    /// Tears down anything the concern mounted. No-op by default.
    fn remove(&self) {}

    /// Removes the UI, unregisters from the controller, and drops all
    /// listeners. Idempotent.
    fn destroy(&self) {
        if !self.core().begin_destroy() {
            return;
        }
        self.remove();
        self.core().finish_destroy();
    }
}
