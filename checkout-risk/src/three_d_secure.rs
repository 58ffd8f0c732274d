//! 3-D Secure concern.
//!
//! On construction the concern fetches the action profile for its action
//! token (`GET /token/{actionToken}`). When the profile arrives it picks a
//! strategy, becomes ready, and emits `ready`. [`Concern::attach`] mounts the
//! strategy's challenge immediately once ready, or waits for `ready`
//! otherwise. If the fetch fails the concern emits `error` and never becomes
//! ready, so waiting attaches never run.
//!
//! The profile payload is opaque: any JSON document other than `null` makes
//! the concern ready.

use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::concern::{Concern, ConcernCore, ConcernEvent, ConcernKind, Readiness};
use crate::controller::ControllerHandle;
use crate::error::{RiskError, TransportError};
use crate::event::EventChannel;
use crate::proto::ActionProfile;
use crate::session::TransportRequest;
use crate::strategy::{Container, Strategy, StrategyContext};

/// Options for [`RiskController::three_d_secure`](crate::controller::RiskController::three_d_secure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDSecureOptions {
    /// Action token issued by the merchant backend.
    pub action_token: String,
}

impl ThreeDSecureOptions {
    /// Creates options for `action_token`.
    #[must_use]
    pub fn new(action_token: impl Into<String>) -> Self {
        Self {
            action_token: action_token.into(),
        }
    }
}

/// A 3-D Secure challenge for one action token.
pub struct ThreeDSecure {
    core: ConcernCore,
    me: Weak<Self>,
    action_token: String,
    profile: Mutex<Option<ActionProfile>>,
    strategy: Mutex<Option<Arc<dyn Strategy>>>,
}

impl Debug for ThreeDSecure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreeDSecure")
            .field("core", &self.core)
            .field("action_token", &self.action_token)
            .field("strategy", &self.strategy_name())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ThreeDSecure {
    /// Builds the concern, lets `subscribe` attach listeners, then registers
    /// it and starts the metadata fetch.
    pub(crate) fn create<F>(
        handle: ControllerHandle,
        options: ThreeDSecureOptions,
        subscribe: F,
    ) -> Result<Arc<Self>, RiskError>
    where
        F: FnOnce(&EventChannel<ConcernEvent>),
    {
        if options.action_token.trim().is_empty() {
            return Err(RiskError::InvalidOption {
                name: "action_token",
                expect: "a three_d_secure_action_token_id",
            });
        }

        let concern = Arc::new_cyclic(|me| Self {
            core: ConcernCore::new(handle.clone()),
            me: me.clone(),
            action_token: options.action_token,
            profile: Mutex::new(None),
            strategy: Mutex::new(None),
        });
        subscribe(concern.events());
        handle.register(Arc::clone(&concern) as Arc<dyn Concern>)?;
        concern.fetch_profile()?;
        Ok(concern)
    }

    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "risk.three_d_secure.fetch", skip_all, fields(concern = %self.id()))
    )]
    fn fetch_profile(self: &Arc<Self>) -> Result<(), RiskError> {
        let session = match self.session() {
            Ok(session) => session,
            Err(err) => return self.core.fail(err),
        };
        self.core.begin_fetch();

        let this = Arc::clone(self);
        let request = TransportRequest::get(format!("/token/{}", self.action_token));
        session.request(request, move |result| this.on_profile(result))
    }

    /// Completion handler for the metadata fetch.
    fn on_profile(&self, result: Result<Value, TransportError>) -> Result<(), RiskError> {
        if self.is_destroyed() {
            // No cancellation: the fetch outlived its concern.
            #[cfg(feature = "telemetry")]
            tracing::warn!(concern = %self.id(), "risk.three_d_secure.completed_after_destroy");
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(err) => return self.core.fail(err.into()),
        };
        if payload.is_null() {
            return self.core.fail(RiskError::Decode {
                context: "action profile",
                message: "empty payload".to_owned(),
            });
        }
        let profile = ActionProfile::new(payload);
        let session = match self.session() {
            Ok(session) => session,
            Err(err) => return self.core.fail(err),
        };
        let builder = match self.core.handle().select_strategy(&profile) {
            Ok(builder) => builder,
            Err(err) => return self.core.fail(err),
        };

        let ctx = StrategyContext::new(session, self.action_token.clone(), self.core.events().clone());
        let strategy = match builder.build(ctx, &profile) {
            Ok(strategy) => strategy,
            Err(err) => return self.core.fail(err),
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(concern = %self.id(), strategy = strategy.name(), "risk.three_d_secure.ready");

        *lock(&self.strategy) = Some(Arc::from(strategy));
        *lock(&self.profile) = Some(profile);
        self.core.mark_ready();
        Ok(())
    }

    /// Hands `container` to the strategy.
    fn attach_now(&self, container: Arc<dyn Container>) -> Result<(), RiskError> {
        let strategy = lock(&self.strategy).clone();
        match strategy {
            Some(strategy) => match strategy.attach(container) {
                Ok(()) => Ok(()),
                Err(err) => self.error(err),
            },
            // Ready is only reached after the strategy is stored.
            None => Ok(()),
        }
    }

    /// Returns the action token.
    #[must_use]
    pub fn action_token(&self) -> &str {
        &self.action_token
    }

    /// Returns the fetched action profile, once ready.
    #[must_use]
    pub fn profile(&self) -> Option<ActionProfile> {
        lock(&self.profile).clone()
    }

    /// Returns the selected strategy's name, once ready.
    #[must_use]
    pub fn strategy_name(&self) -> Option<String> {
        lock(&self.strategy).as_ref().map(|s| s.name().to_owned())
    }
}

impl Concern for ThreeDSecure {
    fn core(&self) -> &ConcernCore {
        &self.core
    }

    fn kind(&self) -> ConcernKind {
        ConcernKind::ThreeDSecure
    }

    /// Mounts the challenge now if ready, otherwise on the `ready` event.
    ///
    /// Every call before readiness is queued independently and runs once.
    /// Failures from a queued attach are emitted as `error` events.
    fn attach(&self, container: Arc<dyn Container>) -> Result<(), RiskError> {
        let me = self.me.clone();
        let run = move || match me.upgrade() {
            Some(concern) => concern.attach_now(container),
            None => Ok(()),
        };
        match self.core.when_ready(run) {
            Readiness::Ready(run) => run(),
            Readiness::Deferred => Ok(()),
        }
    }

    fn remove(&self) {
        if let Some(strategy) = lock(&self.strategy).clone() {
            strategy.remove();
        }
    }
}
