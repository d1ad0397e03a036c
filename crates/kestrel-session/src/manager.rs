//! Session Registry and Idle Reaping
//!
//! Tracks every live session by id and force-closes the ones whose peer has
//! gone quiet. Suitable for single-process deployments; embedders with
//! external session stores can keep their own registry and skip this one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::handshake::SessionState;
use crate::session::Session;

struct SessionEntry {
    session: Session,
    created_at: DateTime<Utc>,
}

/// A point-in-time view of one registered session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub pending_requests: usize,
    pub created_at: DateTime<Utc>,
}

/// Registry of live sessions with optional idle reaping
#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh session id (UUID v7, time-ordered)
    pub fn new_session_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Register a session under its own id
    pub async fn insert(&self, session: Session) {
        let id = session.id().to_string();
        debug!(session_id = %id, "registering session");
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session,
                created_at: Utc::now(),
            },
        );
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).map(|e| e.session.clone())
    }

    /// Remove a session from the registry without closing it
    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.write().await.remove(id).map(|e| e.session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot of every registered session
    pub async fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, entry)| SessionSummary {
                id: id.clone(),
                state: entry.session.state(),
                pending_requests: entry.session.pending_count(),
                created_at: entry.created_at,
            })
            .collect()
    }

    /// Force-close and deregister every session
    pub async fn close_all(&self) {
        let entries: Vec<SessionEntry> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, entry)| entry).collect()
        };
        info!(count = entries.len(), "closing all sessions");
        for entry in entries {
            entry.session.close().await;
        }
    }

    /// Spawn the reaper task: every `interval`, force-close sessions idle
    /// for longer than `idle_timeout`. Abort the returned handle to stop
    /// reaping.
    pub fn spawn_reaper(&self, idle_timeout: Duration, interval: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let expired: Vec<(String, Session)> = {
                    let sessions = sessions.read().await;
                    sessions
                        .iter()
                        .filter(|(_, entry)| {
                            entry.session.last_active().elapsed() > idle_timeout
                        })
                        .map(|(id, entry)| (id.clone(), entry.session.clone()))
                        .collect()
                };

                for (id, session) in expired {
                    info!(session_id = %id, "reaping idle session");
                    session.close().await;
                    sessions.write().await.remove(&id);
                }
            }
        })
    }
}
