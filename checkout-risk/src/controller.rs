//! Risk controller: the per-session registry of active concerns.
//!
//! [`RiskController`] is the single source of truth for which concerns are
//! active in a checkout session. Concerns register themselves on
//! construction and unregister on [`Concern::destroy`]. They reach back to
//! the controller through a [`ControllerHandle`], a non-owning handle that
//! never keeps the controller alive.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::concern::{Concern, ConcernCore, ConcernEvent};
use crate::error::RiskError;
use crate::event::EventChannel;
use crate::proto::ActionProfile;
use crate::session::Session;
use crate::strategy::{StrategyBuilder, StrategySelector};
use crate::three_d_secure::{ThreeDSecure, ThreeDSecureOptions};

/// Identity of a concern within its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConcernId(u64);

impl Display for ConcernId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "concern-{}", self.0)
    }
}

struct Entry {
    id: ConcernId,
    concern: Arc<dyn Concern>,
}

struct ControllerInner {
    session: Session,
    selector: StrategySelector,
    concerns: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl ControllerInner {
    fn concerns(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.concerns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry and factory host for the concerns of one checkout session.
///
/// Cloning yields another reference to the same registry.
///
/// # Example
///
/// ```rust,ignore
/// let controller = RiskController::new(session);
/// let concern = controller.three_d_secure(ThreeDSecureOptions::new("tok_123"))?;
/// concern.events().on(ConcernEventKind::Token, |event| { /* ... */ });
/// concern.attach(container)?;
/// ```
#[derive(Clone)]
pub struct RiskController {
    inner: Arc<ControllerInner>,
}

impl Debug for RiskController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self
            .inner
            .concerns()
            .iter()
            .map(|e| e.id.to_string())
            .collect();
        f.debug_struct("RiskController")
            .field("session", &self.inner.session)
            .field("selector", &self.inner.selector)
            .field("concerns", &ids)
            .finish()
    }
}

impl RiskController {
    /// Creates a controller using the default strategy selector.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self::with_selector(session, StrategySelector::default())
    }

    /// Creates a controller with a custom strategy selector.
    #[must_use]
    pub fn with_selector(session: Session, selector: StrategySelector) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                session,
                selector,
                concerns: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the shared session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns the strategy selector.
    #[must_use]
    pub fn selector(&self) -> &StrategySelector {
        &self.inner.selector
    }

    /// Allocates a handle for a new concern.
    ///
    /// Factories call this before constructing a concern; the concern then
    /// registers itself with [`ControllerHandle::register`].
    #[must_use]
    pub fn new_handle(&self) -> ControllerHandle {
        let id = ConcernId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        ControllerHandle {
            controller: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Creates a 3-D Secure concern for the given action token.
    ///
    /// The concern is registered before its metadata fetch starts and is
    /// returned while the fetch is still outstanding, unless the transport
    /// completes synchronously. In that case `ready` or `error` has already
    /// been emitted on return; use [`Self::three_d_secure_with`] to
    /// subscribe first.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidOption`] for an empty action token. When
    /// the transport completes synchronously with a failure, that failure is
    /// returned here as well; the concern stays registered in the
    /// [`Errored`](crate::concern::ConcernState::Errored) state until the
    /// controller is torn down.
    pub fn three_d_secure(
        &self,
        options: ThreeDSecureOptions,
    ) -> Result<Arc<ThreeDSecure>, RiskError> {
        self.three_d_secure_with(options, |_| {})
    }

    /// Like [`Self::three_d_secure`], but runs `subscribe` on the concern's
    /// event channel before the metadata fetch starts, so listeners see
    /// `ready` and `error` even from a synchronous transport.
    ///
    /// # Errors
    ///
    /// See [`Self::three_d_secure`].
    pub fn three_d_secure_with<F>(
        &self,
        options: ThreeDSecureOptions,
        subscribe: F,
    ) -> Result<Arc<ThreeDSecure>, RiskError>
    where
        F: FnOnce(&EventChannel<ConcernEvent>),
    {
        ThreeDSecure::create(self.new_handle(), options, subscribe)
    }

    /// Builds a concern around a fresh [`ConcernCore`] and registers it.
    ///
    /// ```rust,ignore
    /// let fraud = controller.create(|core| FraudCheck { core });
    /// ```
    pub fn create<C, F>(&self, build: F) -> Arc<C>
    where
        C: Concern + 'static,
        F: FnOnce(ConcernCore) -> C,
    {
        let concern = Arc::new(build(ConcernCore::new(self.new_handle())));
        self.add(Arc::clone(&concern) as Arc<dyn Concern>);
        concern
    }

    /// Registers a concern. Duplicates are not detected.
    pub fn add(&self, concern: Arc<dyn Concern>) {
        let id = concern.id();
        self.inner.concerns().push(Entry { id, concern });

        #[cfg(feature = "telemetry")]
        tracing::debug!(concern = %id, "risk.controller.add");
    }

    /// Removes the first registration of the concern with `id`.
    ///
    /// Returns `true` if a registration was removed. Calling it again for the
    /// same concern is a no-op returning `false`.
    pub fn remove(&self, id: ConcernId) -> bool {
        let removed = {
            let mut concerns = self.inner.concerns();
            concerns
                .iter()
                .position(|e| e.id == id)
                .map(|index| concerns.remove(index))
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(concern = %id, removed = removed.is_some(), "risk.controller.remove");

        removed.is_some()
    }

    /// Returns `true` if the concern with `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConcernId) -> bool {
        self.inner.concerns().iter().any(|e| e.id == id)
    }

    /// Returns how many times the concern with `id` is registered.
    #[must_use]
    pub fn count(&self, id: ConcernId) -> usize {
        self.inner.concerns().iter().filter(|e| e.id == id).count()
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.concerns().len()
    }

    /// Returns `true` if no concern is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.concerns().is_empty()
    }

    /// Returns the registered concerns in registration order.
    #[must_use]
    pub fn concerns(&self) -> Vec<Arc<dyn Concern>> {
        self.inner
            .concerns()
            .iter()
            .map(|e| Arc::clone(&e.concern))
            .collect()
    }

    /// Destroys every registered concern.
    pub fn destroy_all(&self) {
        for concern in self.concerns() {
            concern.destroy();
        }
        // Concerns that were already destroyed but registered twice leave
        // their extra entries behind.
        self.inner.concerns().clear();
    }
}

/// Non-owning handle from a concern back to its controller.
#[derive(Clone)]
pub struct ControllerHandle {
    controller: Weak<ControllerInner>,
    id: ConcernId,
}

impl Debug for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("id", &self.id)
            .field("attached", &(self.controller.strong_count() > 0))
            .finish()
    }
}

impl ControllerHandle {
    /// Returns the identity allocated for the concern.
    #[must_use]
    pub const fn id(&self) -> ConcernId {
        self.id
    }

    fn controller(&self) -> Result<RiskController, RiskError> {
        self.controller
            .upgrade()
            .map(|inner| RiskController { inner })
            .ok_or(RiskError::ControllerGone)
    }

    /// Registers `concern` with the controller.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ControllerGone`] if the controller was dropped.
    pub fn register(&self, concern: Arc<dyn Concern>) -> Result<(), RiskError> {
        self.controller()?.add(concern);
        Ok(())
    }

    /// Removes the concern from the controller. Returns `true` if it was
    /// registered.
    #[must_use]
    pub fn unregister(&self) -> bool {
        self.controller().is_ok_and(|c| c.remove(self.id))
    }

    /// Returns the controller's session.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ControllerGone`] if the controller was dropped.
    pub fn session(&self) -> Result<Session, RiskError> {
        Ok(self.controller()?.session().clone())
    }

    /// Picks the strategy builder for `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ControllerGone`] if the controller was dropped.
    pub fn select_strategy(
        &self,
        profile: &ActionProfile,
    ) -> Result<Arc<dyn StrategyBuilder>, RiskError> {
        Ok(self.controller()?.selector().select(profile))
    }
}
