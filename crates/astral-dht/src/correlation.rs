//! Request/response correlation.
//!
//! Each outbound request registers a single-capacity rendezvous slot keyed by
//! its request id. The slot is owned by the caller: inserted before send,
//! removed when the exchange resolves. Responses that arrive late or match no
//! slot are dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::messages::DhtMessage;

/// The pending-request table.
#[derive(Debug, Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<String, oneshot::Sender<DhtMessage>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rendezvous slot for `request_id`.
    ///
    /// A duplicate id replaces the old slot, which then reports as timed out
    /// to its waiter; request ids are UUIDs so this only happens under attack.
    pub fn register(&self, request_id: &str) -> oneshot::Receiver<DhtMessage> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(request_id.to_string(), tx);
        }
        rx
    }

    /// Deliver a response to its waiting slot.
    ///
    /// Returns false when no slot matches (late, unsolicited, or already
    /// resolved); such responses are dropped.
    pub fn complete(&self, request_id: &str, response: DhtMessage) -> bool {
        let slot = match self.slots.lock() {
            Ok(mut slots) => slots.remove(request_id),
            Err(_) => None,
        };
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!(request_id, "Dropping unmatched response");
                false
            }
        }
    }

    /// Remove a slot without delivering (timeout or abort).
    pub fn cancel(&self, request_id: &str) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(request_id);
        }
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
