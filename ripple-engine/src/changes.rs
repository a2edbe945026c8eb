//! Store change notifications
//!
//! A broadcast channel of re-render hints. The store is always the source
//! of truth; a notification only says "this entity moved, re-read it". A
//! receiver that lags and misses notifications should re-read the views it
//! renders rather than reconstruct history.
//!
//! Publishing happens after the state lock is released, and only for state
//! that actually changed: an aborted mutation publishes nothing, a rollback
//! publishes the restored IDs.

use ripple_core::EntityKind;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// What kind of movement a subscriber should expect on re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The record exists (new, replaced, or field-updated).
    Upserted,
    /// The record is gone from the store and all projections.
    Removed,
}

/// One re-render hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub kind: EntityKind,
    pub id: Uuid,
    pub change: ChangeKind,
}

impl StoreChange {
    pub fn upserted(kind: EntityKind, id: Uuid) -> Self {
        Self {
            kind,
            id,
            change: ChangeKind::Upserted,
        }
    }

    pub fn removed(kind: EntityKind, id: Uuid) -> Self {
        Self {
            kind,
            id,
            change: ChangeKind::Removed,
        }
    }
}

/// Broadcast fan-out of store changes.
pub struct ChangeBus {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send one hint. Having no subscribers is normal (headless engine).
    pub fn publish(&self, change: StoreChange) {
        match self.tx.send(change) {
            Ok(count) => {
                debug!(kind = %change.kind, id = %change.id, receivers = count, "store change published");
            }
            Err(_) => {
                debug!(kind = %change.kind, id = %change.id, "store change dropped, no receivers");
            }
        }
    }

    pub fn publish_all(&self, changes: impl IntoIterator<Item = StoreChange>) {
        for change in changes {
            self.publish(change);
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_changes() {
        let bus = ChangeBus::new(8);
        let mut rx = bus.subscribe();
        let change = StoreChange::upserted(EntityKind::Report, Uuid::now_v7());
        bus.publish(change);
        assert_eq!(rx.recv().await.unwrap(), change);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = ChangeBus::new(8);
        bus.publish(StoreChange::removed(EntityKind::Comment, Uuid::now_v7()));
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_all_preserves_order() {
        let bus = ChangeBus::new(8);
        let mut rx = bus.subscribe();
        let first = StoreChange::upserted(EntityKind::Comment, Uuid::now_v7());
        let second = StoreChange::removed(EntityKind::Comment, Uuid::now_v7());
        bus.publish_all([first, second]);
        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
    }
}
