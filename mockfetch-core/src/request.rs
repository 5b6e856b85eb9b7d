//! Request records, their public snapshots and completion handles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::ControllerError;

/// Monotonic identifier of a simulated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(RequestId)
            .map_err(|_| ControllerError::UnknownRequestId(s.to_owned()))
    }
}

/// Options passed alongside a URL, carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    pub method: Option<String>,
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
}

impl RequestInit {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn with_method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Upper-cased method, `GET` when none was given.
    pub fn method_name(&self) -> String {
        self.method
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| "GET".to_owned())
    }
}

/// One simulated in-flight request.
///
/// `expires_at` is `Some` while the request runs and `None` while it is paused.
#[derive(Debug)]
pub struct RequestRecord {
    id: RequestId,
    name: String,
    url: String,
    init: RequestInit,
    latency_ms: u64,
    pub(crate) expires_at: Option<u64>,
    pub(crate) elapsed_ms: u64,
    completion: Option<oneshot::Sender<()>>,
}

impl RequestRecord {
    pub(crate) fn new(
        id: RequestId,
        url: String,
        init: RequestInit,
        latency_ms: u64,
        expires_at: Option<u64>,
        completion: oneshot::Sender<()>,
    ) -> Self {
        let name = format!("{} {}", init.method_name(), url);
        Self {
            id,
            name,
            url,
            init,
            latency_ms,
            expires_at,
            elapsed_ms: 0,
            completion: Some(completion),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn init(&self) -> &RequestInit {
        &self.init
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn is_paused(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Stops the clock for this request, keeping the latency already spent.
    /// Returns `false` if it was already paused.
    pub(crate) fn pause_at(&mut self, now_ms: u64) -> bool {
        let Some(expires_at) = self.expires_at.take() else {
            return false;
        };
        let remaining = expires_at.saturating_sub(now_ms);
        self.elapsed_ms = self.latency_ms.saturating_sub(remaining);
        true
    }

    /// Restarts the clock with whatever latency is left.
    /// Returns `false` if the request was not paused.
    pub(crate) fn resume_at(&mut self, now_ms: u64) -> bool {
        if self.expires_at.is_some() {
            return false;
        }
        let remaining = self.latency_ms.saturating_sub(self.elapsed_ms);
        self.expires_at = Some(now_ms.saturating_add(remaining));
        true
    }

    /// Triggers the completion handle. Later calls do nothing.
    pub(crate) fn complete(&mut self) {
        if let Some(tx) = self.completion.take() {
            // The caller may have dropped its handle; completion still counts.
            let _ = tx.send(());
        }
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            id: self.id,
            name: self.name.clone(),
            url: self.url.clone(),
            method: self.init.method_name(),
            latency_ms: self.latency_ms,
            expires_at: self.expires_at,
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Point-in-time copy of a record, handed to observers and inspectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSnapshot {
    pub id: RequestId,
    pub name: String,
    pub url: String,
    pub method: String,
    pub latency_ms: u64,
    pub expires_at: Option<u64>,
    pub elapsed_ms: u64,
}

impl RequestSnapshot {
    pub fn is_paused(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Latency still owed, measured at `now_ms`.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.expires_at {
            Some(at) => at.saturating_sub(now_ms),
            None => self.latency_ms.saturating_sub(self.elapsed_ms),
        }
    }
}

/// Resolves once the request completes.
///
/// Yields `Err(ControllerError::Dropped)` only if the controller goes away first.
#[derive(Debug)]
pub struct CompletionHandle {
    id: RequestId,
    rx: oneshot::Receiver<()>,
}

impl CompletionHandle {
    pub(crate) fn new(id: RequestId, rx: oneshot::Receiver<()>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Non-blocking check. `None` while the request is still in flight.
    ///
    /// A completion is reported once; afterwards the channel reads as closed.
    pub fn try_complete(&mut self) -> Option<Result<(), ControllerError>> {
        match self.rx.try_recv() {
            Ok(()) => Some(Ok(())),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(ControllerError::Dropped(self.id)))
            }
        }
    }
}

impl Future for CompletionHandle {
    type Output = Result<(), ControllerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let id = this.id;
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ControllerError::Dropped(id)))
    }
}
