//! Pending-Request Correlation Table
//!
//! The single source of truth for "is this id still awaiting a reply".
//! Entries are created at send time and removed exactly once: by a reply
//! from the peer, by the sender abandoning the id (send failure, timeout),
//! or by the drain that runs at session close. A reply whose id is no longer
//! here is an orphan: logged and discarded, never delivered twice.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

use kestrel_json_rpc::{JsonRpcMessage, RequestId};

use crate::error::{SessionError, SessionResult};

/// Completion channel for one pending request
pub type ReplySender = oneshot::Sender<SessionResult<JsonRpcMessage>>;
/// Caller-side handle awaiting a pending request's terminal outcome
pub type ReplyReceiver = oneshot::Receiver<SessionResult<JsonRpcMessage>>;

/// Thread-safe map from outbound request id to its completion handle.
///
/// This is the only session structure mutated by concurrent outbound
/// callers; everything else is written once during the handshake.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<RequestId, ReplySender>>,
    /// Pinged on every removal; the graceful drain waits on it
    removed: Notify,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending entry. Refused if the id is already awaiting a
    /// reply. Id generation makes this unreachable in practice, but the
    /// table enforces it regardless.
    pub fn register(&self, id: RequestId) -> SessionResult<ReplyReceiver> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return Err(SessionError::DuplicateRequestId(id));
        }
        entries.insert(id, tx);
        Ok(rx)
    }

    /// Complete the entry matching this reply's id. Returns `false` for an
    /// orphan: an unknown id, a reply without an id, or a caller that
    /// already gave up. All are logged here and otherwise ignored.
    pub fn resolve(&self, reply: JsonRpcMessage) -> bool {
        let Some(id) = reply.id().cloned() else {
            warn!("received reply without an id; discarding");
            return false;
        };

        let entry = self.entries.lock().remove(&id);
        match entry {
            Some(tx) => {
                self.removed.notify_waiters();
                if tx.send(Ok(reply)).is_err() {
                    // Caller stopped waiting between removal and delivery
                    warn!(request_id = %id, "caller gone before reply delivery; discarding orphan");
                    return false;
                }
                true
            }
            None => {
                warn!(request_id = %id, "orphan reply for unknown or already-resolved id; discarding");
                false
            }
        }
    }

    /// Remove an entry without completing it. The caller produces its own
    /// error (send failure or timeout); a reply arriving later is an orphan.
    pub fn abandon(&self, id: &RequestId) -> Option<ReplySender> {
        let entry = self.entries.lock().remove(id);
        if entry.is_some() {
            debug!(request_id = %id, "abandoned pending request");
            self.removed.notify_waiters();
        }
        entry
    }

    /// Fail every remaining entry with a session-closed error. Used by the
    /// forced close so no caller hangs past it.
    pub fn drain(&self) -> usize {
        let entries: Vec<_> = {
            let mut map = self.entries.lock();
            map.drain().collect()
        };
        let count = entries.len();
        for (id, tx) in entries {
            debug!(request_id = %id, "failing pending request: session closed");
            let _ = tx.send(Err(SessionError::Closed));
        }
        if count > 0 {
            self.removed.notify_waiters();
        }
        count
    }

    /// Resolve once the table is empty. Entries may still be added while
    /// waiting; this only observes emptiness at some instant.
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.removed.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_resolve_roundtrip() {
        let pending = PendingRequests::new();
        let id = RequestId::from("s-0");

        let rx = pending.register(id.clone()).unwrap();
        assert_eq!(pending.len(), 1);

        let reply = JsonRpcMessage::success(id, json!({"ok": true}));
        assert!(pending.resolve(reply));
        assert!(pending.is_empty());

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.into_result().unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_duplicate_register_refused() {
        let pending = PendingRequests::new();
        let id = RequestId::from("s-0");

        let _rx = pending.register(id.clone()).unwrap();
        assert!(matches!(
            pending.register(id),
            Err(SessionError::DuplicateRequestId(_))
        ));
    }

    #[tokio::test]
    async fn test_orphan_reply_is_noop() {
        let pending = PendingRequests::new();
        let reply = JsonRpcMessage::success(RequestId::from("never-sent"), json!(null));
        assert!(!pending.resolve(reply));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_abandon_then_late_reply_is_orphan() {
        let pending = PendingRequests::new();
        let id = RequestId::from("s-1");

        let _rx = pending.register(id.clone()).unwrap();
        assert!(pending.abandon(&id).is_some());
        assert!(pending.is_empty());

        // The late reply finds no entry
        let reply = JsonRpcMessage::success(id, json!(1));
        assert!(!pending.resolve(reply));
    }

    #[tokio::test]
    async fn test_drain_fails_all_callers() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(RequestId::from("s-1")).unwrap();
        let rx2 = pending.register(RequestId::from("s-2")).unwrap();

        assert_eq!(pending.drain(), 2);
        assert!(pending.is_empty());

        assert!(matches!(rx1.await.unwrap(), Err(SessionError::Closed)));
        assert!(matches!(rx2.await.unwrap(), Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_wait_empty_wakes_on_last_removal() {
        let pending = std::sync::Arc::new(PendingRequests::new());
        let id = RequestId::from("s-9");
        let _rx = pending.register(id.clone()).unwrap();

        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move { pending.wait_empty().await })
        };

        tokio::task::yield_now().await;
        pending.abandon(&id);

        waiter.await.unwrap();
    }
}
