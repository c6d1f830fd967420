//! Downstream listener handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use chainrelay_core::types::DownstreamMessage;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("push to {listener} failed: {reason}")]
pub struct PushError {
    pub listener: ListenerId,
    pub reason: String,
}

/// Somewhere a downstream message can be pushed without blocking.
pub trait ListenerSink: Send + Sync {
    fn push(&self, listener: ListenerId, msg: &DownstreamMessage) -> Result<(), PushError>;
}

/// Sink backed by an unbounded channel drained by the connection's writer task.
/// Fails once the receiving side is dropped.
impl ListenerSink for mpsc::UnboundedSender<DownstreamMessage> {
    fn push(&self, listener: ListenerId, msg: &DownstreamMessage) -> Result<(), PushError> {
        self.send(msg.clone()).map_err(|_| PushError {
            listener,
            reason: "connection closed".into(),
        })
    }
}

/// Identity plus push capability for one downstream listener. The registry
/// tracks membership only; the connection itself belongs to whoever created
/// the handle.
#[derive(Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    sink: Arc<dyn ListenerSink>,
}

impl ListenerHandle {
    pub fn new(sink: Arc<dyn ListenerSink>) -> Self {
        Self {
            id: ListenerId::next(),
            sink,
        }
    }

    /// A handle whose pushes arrive on the returned receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownstreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Arc::new(tx)), rx)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn push(&self, msg: &DownstreamMessage) -> Result<(), PushError> {
        self.sink.push(self.id, msg)
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}
