//! Per-user, per-session registry of live notification sinks.
//!
//! Every open `SubscribeToChanges` stream owns one sink. When a session
//! mutates a resource, [`ChangeNotifier::broadcast`] fans the event out to
//! every *other* session of the same user.
//!
//! ## Locking
//! - One `RwLock` guards the two-level map.
//! - `register` / `unregister` / `release` take the write lock.
//! - `broadcast` takes the read lock only long enough to clone the recipient
//!   handles, then delivers with no lock held. `parking_lot` guards are not
//!   `Send`, so a guard held across an `.await` fails to compile.

use super::protocol::ChangeEvent;
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a single delivery failed. Never surfaced past `broadcast`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("notification sink is closed")]
    Closed,
    #[error("notification sink is full")]
    Full,
}

/// Write-only, order-preserving handle bound to one open stream.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

pub type SinkHandle = Arc<dyn NotificationSink>;

/// Identifies one registration so a replaced stream cannot evict its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct Registration {
    id: RegistrationId,
    sink: SinkHandle,
}

/// Bounded channel sink. Delivery never waits: a full or closed channel
/// drops the event.
pub struct ChannelSink {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its stream drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn send(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Single-process change-notification registry.
#[derive(Default)]
pub struct ChangeNotifier {
    /// user_id -> session_id -> registration
    sessions: RwLock<HashMap<String, HashMap<String, Registration>>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for `(user_id, session_id)`, replacing any previous one.
    pub fn register(&self, user_id: &str, session_id: &str, sink: SinkHandle) -> RegistrationId {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let replaced = self
            .sessions
            .write()
            .entry(user_id.to_owned())
            .or_default()
            .insert(session_id.to_owned(), Registration { id, sink });

        if replaced.is_some() {
            tracing::debug!(user_id, session_id, "Replaced existing notification sink");
        }
        id
    }

    /// Remove the sink for `(user_id, session_id)`. Returns false if absent.
    pub fn unregister(&self, user_id: &str, session_id: &str) -> bool {
        self.remove_where(user_id, session_id, |_| true)
    }

    /// Remove the sink only if it is still the one `registration` installed.
    pub fn release(&self, user_id: &str, session_id: &str, registration: RegistrationId) -> bool {
        self.remove_where(user_id, session_id, |current| current.id == registration)
    }

    fn remove_where(
        &self,
        user_id: &str,
        session_id: &str,
        matches: impl FnOnce(&Registration) -> bool,
    ) -> bool {
        let mut sessions = self.sessions.write();
        let Some(user_sessions) = sessions.get_mut(user_id) else {
            return false;
        };

        let removed = match user_sessions.get(session_id) {
            Some(current) if matches(current) => user_sessions.remove(session_id).is_some(),
            _ => false,
        };

        if user_sessions.is_empty() {
            sessions.remove(user_id);
        }
        removed
    }

    /// Deliver `event` to every session of `user_id` except `origin_session_id`.
    ///
    /// Best-effort: a failed delivery is logged and skipped. Returns the
    /// number of sinks that accepted the event.
    pub async fn broadcast(&self, user_id: &str, origin_session_id: &str, event: &ChangeEvent) -> usize {
        let recipients = self.recipients(user_id, origin_session_id);
        if recipients.is_empty() {
            return 0;
        }

        let results = join_all(recipients.iter().map(|(_, sink)| sink.send(event))).await;

        let mut delivered = 0;
        for ((session_id, _), result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(
                    user_id,
                    session_id = session_id.as_str(),
                    kind = %event.kind,
                    "Dropped change notification: {e}"
                ),
            }
        }
        delivered
    }

    /// Snapshot of the sinks to deliver to. The read lock ends with this call.
    fn recipients(&self, user_id: &str, origin_session_id: &str) -> Vec<(String, SinkHandle)> {
        let sessions = self.sessions.read();
        sessions
            .get(user_id)
            .map(|user_sessions| {
                user_sessions
                    .iter()
                    .filter(|(session_id, _)| session_id.as_str() != origin_session_id)
                    .map(|(session_id, reg)| (session_id.clone(), Arc::clone(&reg.sink)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live sessions registered for `user_id`.
    pub fn session_count(&self, user_id: &str) -> usize {
        self.sessions.read().get(user_id).map_or(0, HashMap::len)
    }

    /// Number of users with at least one live session (for diagnostics).
    pub fn user_count(&self) -> usize {
        self.sessions.read().len()
    }
}

// ── Tests ───────────────────────────────────────────────────────
