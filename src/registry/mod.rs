//! In-memory table of live push connections, one entry per physical client
//! session. A user can hold several entries at once (multi-device). Never
//! persisted: losing it on restart is fine because the alarm table is the
//! source of truth.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::PushEvent;
use crate::metrics;

/// Channel handle a connection's SSE stream reads from.
pub type PushSender = mpsc::UnboundedSender<PushEvent>;

struct Entry {
    user_id: Uuid,
    sender: PushSender,
    #[allow(dead_code)]
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    by_conn: HashMap<String, Entry>,
    by_user: HashMap<Uuid, Vec<String>>,
}

pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
    next_seq: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a connection and return its id. Ids are namespaced as
    /// `"{user_id}-{suffix}"` so every device of a user can be enumerated.
    pub async fn register(&self, user_id: Uuid, sender: PushSender) -> String {
        let suffix = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let connection_id = format!("{user_id}-{suffix}");

        let mut inner = self.inner.write().await;
        inner.by_conn.insert(
            connection_id.clone(),
            Entry {
                user_id,
                sender,
                registered_at: Utc::now(),
            },
        );
        inner
            .by_user
            .entry(user_id)
            .or_default()
            .push(connection_id.clone());
        metrics::set_active_connections(inner.by_conn.len());

        debug!(%connection_id, "registered push connection");
        connection_id
    }

    /// Consistent snapshot of every live connection for a user. Handles are
    /// cloned so callers push without holding the lock.
    pub async fn find_by_user(&self, user_id: Uuid) -> Vec<(String, PushSender)> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        inner
                            .by_conn
                            .get(id)
                            .map(|e| (id.clone(), e.sender.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn remove(&self, connection_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.by_conn.remove(connection_id) else {
            return false;
        };
        if let Some(ids) = inner.by_user.get_mut(&entry.user_id) {
            ids.retain(|id| id != connection_id);
            if ids.is_empty() {
                inner.by_user.remove(&entry.user_id);
            }
        }
        metrics::set_active_connections(inner.by_conn.len());
        true
    }

    /// Bulk removal on logout or account deletion. Returns how many
    /// connections were dropped.
    pub async fn remove_all_for_user(&self, user_id: Uuid) -> usize {
        let mut inner = self.inner.write().await;
        let ids = inner.by_user.remove(&user_id).unwrap_or_default();
        for id in &ids {
            inner.by_conn.remove(id);
        }
        metrics::set_active_connections(inner.by_conn.len());
        ids.len()
    }

    /// Fan one event out to every live connection of a user. A failed send
    /// means the client is gone: the connection is pruned silently and the
    /// remaining connections still receive the event. Returns the number of
    /// connections reached; zero is a valid outcome (user offline).
    pub async fn push_to_user(&self, user_id: Uuid, event: PushEvent) -> usize {
        let targets = self.find_by_user(user_id).await;

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (connection_id, sender) in targets {
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                gone.push(connection_id);
            }
        }

        for connection_id in gone {
            debug!(%connection_id, "client gone, pruning connection");
            self.remove(&connection_id).await;
        }

        delivered
    }

    /// Send one event to a single connection. Returns `false` when the
    /// connection is gone; a failed write removes it. The registry keeps
    /// the only persistent sender per connection, so once the entry is
    /// dropped the client's channel closes and its stream terminates.
    pub async fn send_to_connection(&self, connection_id: &str, event: PushEvent) -> bool {
        let sender = {
            let inner = self.inner.read().await;
            match inner.by_conn.get(connection_id) {
                Some(entry) => entry.sender.clone(),
                None => return false,
            }
        };
        if sender.send(event).is_ok() {
            return true;
        }
        self.remove(connection_id).await;
        false
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner.by_user.get(&user_id).map(Vec::len).unwrap_or(0)
    }

    pub async fn total_connections(&self) -> usize {
        let inner = self.inner.read().await;
        inner.by_conn.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
