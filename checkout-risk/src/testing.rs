//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::concern::{ConcernEvent, ConcernEventKind};
use crate::config::SessionConfig;
use crate::error::{RiskError, TransportError};
use crate::event::EventChannel;
use crate::session::{Session, Transport, TransportCallback, TransportRequest};
use crate::strategy::{ChallengeFrame, Container, FrameCallback};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session over `transport` with the `ewr1-test` public key.
pub fn session_with(transport: MockTransport) -> Session {
    Session::new(SessionConfig::new("ewr1-test"), transport)
}

#[derive(Default)]
struct MockState {
    reply: Option<Result<Value, TransportError>>,
    requests: Vec<TransportRequest>,
    pending: VecDeque<TransportCallback>,
}

/// Transport that records requests and completes them on demand.
///
/// A deferred transport parks every callback until [`MockTransport::resolve_next`];
/// an immediate one answers each request synchronously with a fixed reply.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockTransport")
            .field("requests", &state.requests)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl MockTransport {
    pub fn deferred() -> Self {
        Self::default()
    }

    pub fn immediate(reply: Result<Value, TransportError>) -> Self {
        let transport = Self::default();
        lock(&transport.state).reply = Some(reply);
        transport
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Completes the oldest parked request with `result`.
    pub fn resolve_next(&self, result: Result<Value, TransportError>) -> Result<(), RiskError> {
        let callback = lock(&self.state)
            .pending
            .pop_front()
            .expect("no pending request");
        callback(result)
    }
}

impl Transport for MockTransport {
    fn request(
        &self,
        request: TransportRequest,
        callback: TransportCallback,
    ) -> Result<(), RiskError> {
        let reply = {
            let mut state = lock(&self.state);
            state.requests.push(request);
            match state.reply.clone() {
                Some(reply) => reply,
                None => {
                    state.pending.push_back(callback);
                    return Ok(());
                }
            }
        };
        callback(reply)
    }
}

/// Container that records mounts and lets the test finish the challenge.
#[derive(Default)]
pub struct RecordingContainer {
    frames: Mutex<Vec<ChallengeFrame>>,
    callbacks: Mutex<VecDeque<FrameCallback>>,
    unmounts: AtomicUsize,
    mount_error: Option<RiskError>,
}

impl Debug for RecordingContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingContainer")
            .field("frames", &lock(&self.frames).len())
            .field("unmounts", &self.unmount_count())
            .finish_non_exhaustive()
    }
}

impl RecordingContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A container whose `mount` always fails with `err`.
    pub fn failing(err: RiskError) -> Arc<Self> {
        Arc::new(Self {
            mount_error: Some(err),
            ..Self::default()
        })
    }

    pub fn frames(&self) -> Vec<ChallengeFrame> {
        lock(&self.frames).clone()
    }

    pub fn mount_count(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    /// Reports `outcome` to the oldest mounted frame.
    pub fn complete(&self, outcome: Result<Value, RiskError>) -> Result<(), RiskError> {
        let callback = lock(&self.callbacks).pop_front();
        match callback {
            Some(callback) => callback(outcome),
            None => Err(RiskError::challenge("not_mounted", "no frame is mounted")),
        }
    }
}

impl Container for RecordingContainer {
    fn mount(&self, frame: ChallengeFrame, on_complete: FrameCallback) -> Result<(), RiskError> {
        if let Some(err) = &self.mount_error {
            return Err(err.clone());
        }
        lock(&self.frames).push(frame);
        lock(&self.callbacks).push_back(on_complete);
        Ok(())
    }

    fn unmount(&self) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every event emitted on a concern channel.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ConcernEvent>>>,
}

impl EventLog {
    pub fn attach(channel: &EventChannel<ConcernEvent>) -> Self {
        let log = Self::default();
        for kind in [
            ConcernEventKind::Ready,
            ConcernEventKind::Token,
            ConcernEventKind::Error,
        ] {
            let events = Arc::clone(&log.events);
            channel.on(kind, move |event| lock(&events).push(event.clone()));
        }
        log
    }

    pub fn events(&self) -> Vec<ConcernEvent> {
        lock(&self.events).clone()
    }

    pub fn count(&self, kind: ConcernEventKind) -> usize {
        use crate::event::Event;
        lock(&self.events).iter().filter(|e| e.kind() == kind).count()
    }
}
