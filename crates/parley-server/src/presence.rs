//! Presence registry: which user currently holds which socket.
//!
//! One entry per user; a newer connection replaces the older one. Every
//! mutation announces the full roster (sorted user ids) to subscribers,
//! including mutations that change nothing, so repeated disconnects still
//! leave everyone with an exact roster.

use std::collections::BTreeMap;
use std::sync::Arc;

use parley_shared::types::{ConnectionId, UserId};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Rosters buffered per subscriber before it starts lagging.
const ROSTER_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<BTreeMap<UserId, ConnectionId>>>,
    roster_tx: broadcast::Sender<Vec<UserId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        let (roster_tx, _) = broadcast::channel(ROSTER_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            roster_tx,
        }
    }

    /// Map `user` to `connection`. Returns the connection it replaced.
    pub async fn register(&self, user: UserId, connection: ConnectionId) -> Option<ConnectionId> {
        let mut entries = self.entries.write().await;
        let previous = entries.insert(user, connection);
        debug!(
            user = %user,
            connection = %connection,
            replaced = previous.is_some(),
            "Presence registered"
        );
        self.announce(&entries);
        previous
    }

    pub async fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.entries.read().await.get(user).copied()
    }

    /// Drop `user` regardless of which connection it points at.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn unregister(&self, user: &UserId) -> Option<ConnectionId> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(user);
        debug!(user = %user, removed = removed.is_some(), "Presence unregistered");
        self.announce(&entries);
        removed
    }

    /// Drop `user` only while it still points at `connection`, so a stale
    /// socket closing after a reconnect leaves the new session in place.
    pub async fn release(&self, user: &UserId, connection: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        let released = match entries.get(user) {
            Some(current) if *current == connection => {
                entries.remove(user);
                true
            }
            _ => false,
        };
        debug!(user = %user, connection = %connection, released, "Presence released");
        self.announce(&entries);
        released
    }

    pub async fn roster(&self) -> Vec<UserId> {
        self.entries.read().await.keys().copied().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<UserId>> {
        self.roster_tx.subscribe()
    }

    // Sent while the write lock is held so rosters go out in mutation order.
    fn announce(&self, entries: &BTreeMap<UserId, ConnectionId>) {
        let roster: Vec<UserId> = entries.keys().copied().collect();
        // No subscribers is fine.
        let _ = self.roster_tx.send(roster);
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
