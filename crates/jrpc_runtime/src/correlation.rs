//! The Correlation Register (§4.7): maps an outstanding request id to the
//! completion slot its eventual response will fill.
//!
//! Grounded in this workspace's `JsonRpcTransport` pending-request map
//! (`Arc<Mutex<HashMap<RequestId, oneshot::Sender<...>>>>`), generalized
//! from that transport's u64-only ids to this crate's `RequestId`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use crate::message::{ErrorObject, RequestId};

type Slot = oneshot::Sender<Result<serde_json::Value, ErrorObject>>;

/// Monotonically allocates ids and tracks the completion slot for every
/// call still awaiting a reply.
pub struct CorrelationRegister {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, Slot>>,
}

impl Default for CorrelationRegister {
    fn default() -> Self {
        CorrelationRegister {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl CorrelationRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next request id. Rolls over to 1 on overflow; ids
    /// are never reused while a slot for them is still outstanding, so a
    /// wrap only matters for pathologically long-lived clients.
    pub fn allocate_id(&self) -> RequestId {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        if raw <= 0 {
            self.next_id.store(1, Ordering::SeqCst);
            return RequestId::Number(1);
        }
        RequestId::Number(raw)
    }

    /// Registers a fresh slot for `id`, returning the receiver half the
    /// caller awaits.
    pub async fn register(&self, id: RequestId) -> oneshot::Receiver<Result<serde_json::Value, ErrorObject>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Completes the slot for `id` with the decoded response payload.
    /// A missing id (already cancelled, timed out, or a duplicate/late
    /// reply) is silently ignored.
    pub async fn complete(&self, id: &RequestId, payload: Result<serde_json::Value, ErrorObject>) {
        if let Some(slot) = self.pending.lock().await.remove(id) {
            let _ = slot.send(payload);
        }
    }

    /// Removes the slot for `id` without completing it; dropping the
    /// sender half causes the awaiting receiver to observe a closed
    /// channel, which the caller maps to cancellation.
    pub async fn cancel(&self, id: &RequestId) {
        self.pending.lock().await.remove(id);
    }

    /// Drains every still-outstanding slot and drops its sender, so every
    /// caller still awaiting a reply observes a closed channel instead of
    /// hanging forever. Called once the reader task observes the
    /// transport has closed (§7: "all pending correlation slots are
    /// completed with `Transport`").
    pub async fn fail_all(&self) {
        self.pending.lock().await.clear();
    }
}

pub type SharedCorrelationRegister = Arc<CorrelationRegister>;
