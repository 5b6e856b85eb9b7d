//! ## mockfetch-core::controller
//! **Single-timer scheduler for simulated requests**
//!
//! `MockFetchController` keeps the live requests and at most one armed
//! wake-up timer. Every call that can move the earliest expiration
//! (fetch, pause, resume, timer fire) re-evaluates that timer on the spot:
//! cancel, then arm for the new minimum, or arm nothing.
//!
//! The earliest expiration is found by scanning the live set. A min-heap keyed
//! by expiration would behave identically.
//!
//! ### Resolution
//! When the timer fires, and after every pause or resume, each running request
//! whose expiration lies within `resolution_tolerance` of now is completed and
//! removed. Several requests may complete in one pass; they are announced in
//! expiration order.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::ControllerError;
use crate::events::{ControllerEvent, EventBus};
use crate::request::{CompletionHandle, RequestId, RequestInit, RequestRecord, RequestSnapshot};
use crate::settings::{duration_ms, ControllerSettings};
use crate::time::SimClock;

/// Simulated fetch with pausable, ordered completions.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct MockFetchController {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    events: EventBus,
    clock: SimClock,
    runtime: Handle,
}

struct State {
    latency_ms: u64,
    tolerance_ms: u64,
    new_requests_paused: bool,
    next_id: u64,
    records: HashMap<RequestId, RequestRecord>,
    timer: Option<ArmedTimer>,
    generation: u64,
}

/// The one outstanding wake-up.
struct ArmedTimer {
    target_ms: u64,
    generation: u64,
    task: JoinHandle<()>,
}

impl State {
    fn allocate_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId::new(self.next_id)
    }

    fn earliest_expiration(&self) -> Option<u64> {
        self.records.values().filter_map(|r| r.expires_at).min()
    }

    /// Removes every running record due by `now_ms + tolerance`, earliest first.
    fn take_expired(&mut self, now_ms: u64) -> Vec<RequestRecord> {
        let horizon = now_ms.saturating_add(self.tolerance_ms);
        let mut due: Vec<(u64, RequestId)> = self
            .records
            .values()
            .filter_map(|r| r.expires_at.filter(|&at| at <= horizon).map(|at| (at, r.id())))
            .collect();
        due.sort_unstable();
        due.into_iter()
            .filter_map(|(_, id)| self.records.remove(&id))
            .collect()
    }
}

impl MockFetchController {
    /// Creates a controller bound to the current tokio runtime.
    pub fn new(settings: ControllerSettings) -> Result<Self, ControllerError> {
        let runtime = Handle::try_current().map_err(|_| ControllerError::TimerUnavailable)?;
        let state = State {
            latency_ms: duration_ms(settings.latency),
            tolerance_ms: duration_ms(settings.resolution_tolerance),
            new_requests_paused: settings.new_requests_paused,
            next_id: 0,
            records: HashMap::new(),
            timer: None,
            generation: 0,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                events: EventBus::new(),
                clock: SimClock::new(),
                runtime,
            }),
        })
    }

    /// Starts a simulated request and returns its completion handle at once.
    pub fn fetch(&self, url: impl Into<String>, init: RequestInit) -> CompletionHandle {
        let (tx, rx) = oneshot::channel();
        let url = url.into();
        let (id, event) = {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now_ms();
            let id = state.allocate_id();
            let expires_at =
                (!state.new_requests_paused).then(|| now.saturating_add(state.latency_ms));
            let record = RequestRecord::new(id, url, init, state.latency_ms, expires_at, tx);
            info!(
                request = %id,
                name = record.name(),
                latency_ms = state.latency_ms,
                paused = expires_at.is_none(),
                "new request"
            );
            let event = ControllerEvent::NewRequest(record.snapshot());
            state.records.insert(id, record);
            if expires_at.is_some() {
                self.inner.rearm(&mut state);
            }
            (id, event)
        };
        self.inner.events.publish(&event);
        CompletionHandle::new(id, rx)
    }

    /// Stops a running request's clock. Pausing a paused request does nothing.
    pub fn pause(&self, id: RequestId) -> Result<(), ControllerError> {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now_ms();
            let record = state
                .records
                .get_mut(&id)
                .ok_or_else(|| ControllerError::UnknownRequestId(id.to_string()))?;
            if !record.pause_at(now) {
                trace!(request = %id, "already paused");
                return Ok(());
            }
            info!(request = %id, elapsed_ms = record.elapsed_ms, "request paused");
            events.push(ControllerEvent::RequestPaused(record.snapshot()));
            self.inner.settle(&mut state, now, &mut events);
        }
        self.inner.events.publish_all(events);
        Ok(())
    }

    /// Restarts a paused request with the latency it had left.
    pub fn resume(&self, id: RequestId) -> Result<(), ControllerError> {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            let now = self.inner.clock.now_ms();
            let record = state
                .records
                .get_mut(&id)
                .ok_or_else(|| ControllerError::UnknownRequestId(id.to_string()))?;
            if !record.resume_at(now) {
                return Err(ControllerError::InvalidResumeState(id));
            }
            info!(request = %id, expires_at = record.expires_at, "request resumed");
            events.push(ControllerEvent::RequestResumed(record.snapshot()));
            self.inner.settle(&mut state, now, &mut events);
        }
        self.inner.events.publish_all(events);
        Ok(())
    }

    /// `pause` keyed by the id's string form.
    pub fn pause_str(&self, id: &str) -> Result<(), ControllerError> {
        self.pause(id.parse()?)
    }

    /// `resume` keyed by the id's string form.
    pub fn resume_str(&self, id: &str) -> Result<(), ControllerError> {
        self.resume(id.parse()?)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.inner.state.lock().latency_ms)
    }

    /// Applies to requests created from now on.
    pub fn set_latency(&self, latency: Duration) {
        let ms = duration_ms(latency);
        self.inner.state.lock().latency_ms = ms;
        debug!(latency_ms = ms, "latency changed");
    }

    pub fn new_requests_paused(&self) -> bool {
        self.inner.state.lock().new_requests_paused
    }

    pub fn set_new_requests_paused(&self, paused: bool) {
        self.inner.state.lock().new_requests_paused = paused;
        debug!(paused, "new requests paused toggled");
    }

    pub fn resolution_tolerance(&self) -> Duration {
        Duration::from_millis(self.inner.state.lock().tolerance_ms)
    }

    /// Live requests, ordered by id.
    pub fn requests(&self) -> Vec<RequestSnapshot> {
        let state = self.inner.state.lock();
        let mut out: Vec<_> = state.records.values().map(RequestRecord::snapshot).collect();
        out.sort_unstable_by_key(|r| r.id);
        out
    }

    pub fn request(&self, id: RequestId) -> Option<RequestSnapshot> {
        self.inner.state.lock().records.get(&id).map(RequestRecord::snapshot)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    /// Expiration the single timer is armed for, if any.
    pub fn armed_target(&self) -> Option<u64> {
        self.inner.state.lock().timer.as_ref().map(|t| t.target_ms)
    }

    /// Current controller time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// The clock expirations are measured against.
    pub fn clock(&self) -> SimClock {
        self.inner.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }
}

impl std::fmt::Debug for MockFetchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MockFetchController")
            .field("latency_ms", &state.latency_ms)
            .field("new_requests_paused", &state.new_requests_paused)
            .field("in_flight", &state.records.len())
            .field("armed_target", &state.timer.as_ref().map(|t| t.target_ms))
            .finish()
    }
}

impl Inner {
    /// Resolves what is due, then rearms.
    fn settle(self: &Arc<Self>, state: &mut State, now_ms: u64, events: &mut Vec<ControllerEvent>) {
        for mut record in state.take_expired(now_ms) {
            record.complete();
            info!(request = %record.id(), name = record.name(), now_ms, "request completed");
            events.push(ControllerEvent::RequestCompleted(record.snapshot()));
        }
        self.rearm(state);
    }

    /// Points the single timer at the earliest running expiration.
    fn rearm(self: &Arc<Self>, state: &mut State) {
        let Some(target) = state.earliest_expiration() else {
            if let Some(timer) = state.timer.take() {
                timer.task.abort();
                debug!(target_ms = timer.target_ms, "timer cleared");
            }
            return;
        };

        if state.timer.as_ref().is_some_and(|t| t.target_ms == target) {
            return;
        }
        if let Some(old) = state.timer.take() {
            old.task.abort();
            trace!(target_ms = old.target_ms, "timer cancelled");
        }

        state.generation += 1;
        let generation = state.generation;
        let deadline = self.clock.deadline(target);
        let weak: Weak<Inner> = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timer(generation);
            }
        });
        debug!(target_ms = target, generation, "timer armed");
        state.timer = Some(ArmedTimer {
            target_ms: target,
            generation,
            task,
        });
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            if state.timer.as_ref().map(|t| t.generation) != Some(generation) {
                trace!(generation, "stale timer ignored");
                return;
            }
            // Running inside this timer's task: detach rather than abort.
            state.timer = None;
            let now = self.clock.now_ms();
            trace!(now_ms = now, generation, "timer fired");
            self.settle(&mut state, now, &mut events);
        }
        self.events.publish_all(events);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.task.abort();
        }
    }
}

/// Fetch-shaped convenience: waits until the simulated request completes.
pub async fn mock_fetch(
    controller: &MockFetchController,
    url: impl Into<String>,
    init: RequestInit,
) -> Result<(), ControllerError> {
    controller.fetch(url, init).await
}
