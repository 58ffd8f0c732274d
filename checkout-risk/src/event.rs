//! Typed publish/subscribe channel.
//!
//! [`EventChannel`] is the notification primitive shared by concerns and
//! strategies. Delivery is synchronous: [`EventChannel::emit`] runs every
//! listener registered for the event's kind at the moment `emit` starts, in
//! registration order, before returning. Listeners added during an emission
//! do not see it. `once` listeners are unregistered before they run.
//!
//! A channel is torn down explicitly with [`EventChannel::close`]; after that
//! every listener is gone and further emissions are dropped.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An event that can travel through an [`EventChannel`].
pub trait Event {
    /// Discriminant listeners subscribe to.
    type Kind: Copy + Eq + Debug + Send;

    /// Returns the kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Identifies a registered listener so it can be removed with
/// [`EventChannel::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type EveryFn<E> = Arc<dyn Fn(&E) + Send + Sync>;
type OnceFn<E> = Box<dyn FnOnce(&E) + Send>;

enum Callback<E> {
    Every(EveryFn<E>),
    Once(OnceFn<E>),
}

struct Listener<E: Event> {
    id: ListenerId,
    kind: E::Kind,
    callback: Callback<E>,
}

struct ChannelState<E: Event> {
    listeners: Vec<Listener<E>>,
    closed: bool,
}

/// Typed event channel. Clones share the same listener set.
pub struct EventChannel<E: Event> {
    state: Arc<Mutex<ChannelState<E>>>,
}

impl<E: Event> Clone for EventChannel<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E: Event> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EventChannel")
            .field("listeners", &state.listeners.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<E: Event> EventChannel<E> {
    /// Creates an open channel with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                listeners: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, kind: E::Kind, callback: Callback<E>) -> ListenerId {
        let id = ListenerId::next();
        let mut state = self.lock();
        // A closed channel never delivers again; the listener is dropped.
        if !state.closed {
            state.listeners.push(Listener { id, kind, callback });
        }
        id
    }

    /// Registers a listener for every future event of `kind`.
    pub fn on<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(kind, Callback::Every(Arc::new(listener)))
    }

    /// Registers a listener for the next event of `kind` only.
    pub fn once<F>(&self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.subscribe(kind, Callback::Once(Box::new(listener)))
    }

    /// Removes a listener. Returns `true` if it was still registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        state.listeners.len() != before
    }

    /// Removes every listener but leaves the channel open.
    pub fn off_all(&self) {
        self.lock().listeners.clear();
    }

    /// Removes every listener and stops all further delivery.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.listeners.clear();
    }

    /// Returns `true` once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns the number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }

    /// Delivers `event` to the listeners registered for its kind and returns
    /// how many were invoked.
    ///
    /// The listener set is snapshotted before any listener runs, and no lock
    /// is held while they run, so listeners may freely subscribe, unsubscribe,
    /// emit, or close the channel.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let batch = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            let mut batch = Vec::new();
            let listeners = std::mem::take(&mut state.listeners);
            for Listener {
                id,
                kind: listener_kind,
                callback,
            } in listeners
            {
                if listener_kind != kind {
                    state.listeners.push(Listener {
                        id,
                        kind: listener_kind,
                        callback,
                    });
                    continue;
                }
                match callback {
                    Callback::Every(f) => {
                        batch.push(Callback::Every(Arc::clone(&f)));
                        state.listeners.push(Listener {
                            id,
                            kind: listener_kind,
                            callback: Callback::Every(f),
                        });
                    }
                    once @ Callback::Once(_) => batch.push(once),
                }
            }
            batch
        };

        let delivered = batch.len();
        for callback in batch {
            match callback {
                Callback::Every(f) => f(event),
                Callback::Once(f) => f(event),
            }
        }
        delivered
    }
}
