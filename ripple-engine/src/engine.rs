//! Session facade
//!
//! `SessionEngine` is the one constructed instance owning all engine state
//! for a session. It is deliberately not a singleton: construct one at
//! session start, drop it (or `clear` it) at logout.
//!
//! All state sits behind a single `std::sync::RwLock` acquired for
//! microtask-length critical sections and never held across an await.
//! Mutations live in `coordinator`, loads in `loader`, realtime merges in
//! `reconcile`; this file holds construction, reads, and the shared lock
//! plumbing they all go through.

use crate::changes::{ChangeBus, StoreChange};
use crate::coordinator::PendingWrites;
use crate::identity::{IdentityGate, IdentityResolver};
use crate::loader::LoadTracker;
use crate::projection::{ListProjections, ProjectionKey};
use crate::store::EntityStore;
use crate::transport::FeedTransport;
use async_trait::async_trait;
use ripple_core::{
    ActorId, Badge, BadgeId, Comment, CommentId, EntityKind, MutationError, Report, ReportId,
    SyncResult,
};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Called after a counter-affecting mutation commits. Spawned detached;
/// failures are logged and never reach the committed mutation.
#[async_trait]
pub trait CounterHook: Send + Sync {
    async fn counters_changed(&self, kind: EntityKind, id: Uuid) -> SyncResult<()>;
}

/// Store/projection sizes for diagnostics surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub reports: usize,
    pub comments: usize,
    pub badges: usize,
    pub projections: usize,
    pub pending_writes: usize,
}

pub(crate) struct SessionState {
    pub(crate) store: EntityStore,
    pub(crate) projections: ListProjections,
    pub(crate) loads: LoadTracker,
    pub(crate) pending: PendingWrites,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            store: EntityStore::new(),
            projections: ListProjections::new(),
            loads: LoadTracker::new(),
            pending: PendingWrites::new(),
        }
    }
}

pub struct SessionEngine {
    pub(crate) state: RwLock<SessionState>,
    pub(crate) gate: IdentityGate,
    pub(crate) transport: Arc<dyn FeedTransport>,
    pub(crate) changes: ChangeBus,
    pub(crate) hook: Option<Arc<dyn CounterHook>>,
}

impl SessionEngine {
    pub fn new(transport: Arc<dyn FeedTransport>, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self {
            state: RwLock::new(SessionState::new()),
            gate: IdentityGate::new(resolver),
            transport,
            changes: ChangeBus::default(),
            hook: None,
        }
    }

    /// Attach the counters-changed hook (badge evaluation hangs off this).
    pub fn with_counter_hook(mut self, hook: Arc<dyn CounterHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    // ========================================================================
    // LOCK PLUMBING
    // ========================================================================

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, SessionState>, MutationError> {
        self.state.read().map_err(|_| MutationError::LockPoisoned)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, SessionState>, MutationError> {
        self.state.write().map_err(|_| MutationError::LockPoisoned)
    }

    /// Publish outside the lock; callers collect changes under the lock,
    /// drop the guard, then hand them here.
    pub(crate) fn publish_all(&self, changes: Vec<StoreChange>) {
        self.changes.publish_all(changes);
    }

    pub(crate) fn spawn_counter_hook(&self, kind: EntityKind, id: Uuid) {
        if let Some(hook) = &self.hook {
            let hook = Arc::clone(hook);
            tokio::spawn(async move {
                if let Err(err) = hook.counters_changed(kind, id).await {
                    warn!(kind = %kind, %id, %err, "counters hook failed");
                }
            });
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn report(&self, id: &ReportId) -> SyncResult<Option<Report>> {
        Ok(self.read()?.store.report(id).cloned())
    }

    pub fn comment(&self, id: &CommentId) -> SyncResult<Option<Comment>> {
        Ok(self.read()?.store.comment(id).cloned())
    }

    pub fn badge(&self, id: &BadgeId) -> SyncResult<Option<Badge>> {
        Ok(self.read()?.store.badge(id).cloned())
    }

    /// Feed in projection order. `None` means the feed was never loaded;
    /// `Some(vec![])` means loaded and empty.
    pub fn feed(&self) -> SyncResult<Option<Vec<Report>>> {
        let state = self.read()?;
        Ok(state.projections.ids(&ProjectionKey::ReportFeed).map(|ids| {
            ids.iter()
                .filter_map(|id| state.store.report(&ReportId::new(*id)).cloned())
                .collect()
        }))
    }

    /// Comment thread for one report, in projection order.
    pub fn comments(&self, report_id: &ReportId) -> SyncResult<Option<Vec<Comment>>> {
        let state = self.read()?;
        let key = ProjectionKey::CommentsFor(*report_id);
        Ok(state.projections.ids(&key).map(|ids| {
            ids.iter()
                .filter_map(|id| state.store.comment(&CommentId::new(*id)).cloned())
                .collect()
        }))
    }

    pub fn badges(&self, actor_id: &ActorId) -> SyncResult<Option<Vec<Badge>>> {
        let state = self.read()?;
        let key = ProjectionKey::BadgesFor(*actor_id);
        Ok(state.projections.ids(&key).map(|ids| {
            ids.iter()
                .filter_map(|id| state.store.badge(&BadgeId::new(*id)).cloned())
                .collect()
        }))
    }

    /// Whether a load for this key is currently in flight. Lets a UI
    /// distinguish "loading" from "loaded empty" from "never loaded".
    pub fn is_loading(&self, key: &ProjectionKey) -> SyncResult<bool> {
        Ok(self.read()?.loads.is_loading(key))
    }

    pub fn counts(&self) -> SyncResult<StoreCounts> {
        let state = self.read()?;
        Ok(StoreCounts {
            reports: state.store.len(EntityKind::Report),
            comments: state.store.len(EntityKind::Comment),
            badges: state.store.len(EntityKind::Badge),
            projections: state.projections.keys().count(),
            pending_writes: state.pending.len(),
        })
    }

    /// Re-render hints. The store stays the source of truth; a lagged
    /// receiver should re-read instead of replaying.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Logout: drop every entity, projection, load generation, and pending
    /// write. A fresh session is a fresh engine; this exists for handles
    /// that outlive the login.
    pub fn clear(&self) -> SyncResult<()> {
        {
            let mut state = self.write()?;
            *state = SessionState::new();
        }
        info!("session state cleared");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
