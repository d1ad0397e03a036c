//! Outbound Request Id Generation
//!
//! Ids are the session id plus an atomically incremented counter, so they are
//! collision-free within a session under arbitrary concurrent callers and
//! cannot collide across sessions either.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kestrel_json_rpc::RequestId;

/// Session-scoped generator for outbound request ids
#[derive(Debug)]
pub struct RequestIdGenerator {
    prefix: Arc<str>,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new(session_id: &str) -> Self {
        Self {
            prefix: Arc::from(session_id),
            counter: AtomicU64::new(0),
        }
    }

    /// Produce the next id. No ordering is guaranteed across concurrent
    /// callers, only uniqueness.
    pub fn next_id(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        RequestId::String(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_carry_session_prefix() {
        let ids = RequestIdGenerator::new("sess-abc");
        assert_eq!(ids.next_id(), RequestId::from("sess-abc-0"));
        assert_eq!(ids.next_id(), RequestId::from("sess-abc-1"));
    }

    #[tokio::test]
    async fn test_concurrent_ids_are_distinct() {
        let ids = Arc::new(RequestIdGenerator::new("s"));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ids = ids.clone();
            tasks.push(tokio::spawn(async move {
                (0..100).map(|_| ids.next_id()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            for id in task.await.unwrap() {
                assert!(seen.insert(id), "generator produced a duplicate id");
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
