//! Loads and in-flight read cancellation
//!
//! Every fetch-and-materialize pass runs against a generation token. A
//! mutation snapshot invalidates the token for the projections it touches,
//! so a read that was already in flight when the user acted cannot land on
//! top of the optimistic write and clobber it. Stale results are discarded
//! whole; nothing is partially applied.

use crate::changes::StoreChange;
use crate::engine::SessionEngine;
use crate::ordering::resort_projection;
use crate::projection::ProjectionKey;
use ripple_core::{ActorId, Badge, Comment, EntityKind, Report, ReportId, SyncResult};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Proof that a load was begun; redeemed once when the fetch returns.
#[derive(Debug, Clone, Copy)]
pub struct LoadTicket {
    key: ProjectionKey,
    generation: u64,
}

impl LoadTicket {
    pub fn key(&self) -> ProjectionKey {
        self.key
    }
}

/// Per-key load generations plus the set of keys with an active fetch.
#[derive(Debug, Default)]
pub struct LoadTracker {
    generations: HashMap<ProjectionKey, u64>,
    loading: HashMap<ProjectionKey, usize>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current generation and mark the key as loading.
    pub fn begin(&mut self, key: ProjectionKey) -> LoadTicket {
        let generation = self.generations.get(&key).copied().unwrap_or(0);
        *self.loading.entry(key).or_insert(0) += 1;
        LoadTicket { key, generation }
    }

    /// Bump the generation so every outstanding ticket for this key becomes
    /// stale, and clear its loading mark.
    pub fn invalidate(&mut self, key: &ProjectionKey) {
        *self.generations.entry(*key).or_insert(0) += 1;
        self.loading.remove(key);
    }

    /// Settle a ticket. Returns whether it is still current, i.e. whether
    /// the fetched rows may be applied.
    pub fn finish(&mut self, ticket: &LoadTicket) -> bool {
        if let Some(count) = self.loading.get_mut(&ticket.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.loading.remove(&ticket.key);
            }
        }
        let current = self.generations.get(&ticket.key).copied().unwrap_or(0);
        current == ticket.generation
    }

    pub fn is_loading(&self, key: &ProjectionKey) -> bool {
        self.loading.contains_key(key)
    }
}

// =============================================================================
// REFRESH OPERATIONS
// =============================================================================

impl SessionEngine {
    /// Fetch the report feed and materialize its projection. Returns whether
    /// the rows were applied; `false` means a mutation invalidated the read
    /// while it was in flight and the rows were discarded.
    pub async fn refresh_feed(&self) -> SyncResult<bool> {
        let key = ProjectionKey::ReportFeed;
        let ticket = {
            let mut state = self.write()?;
            state.loads.begin(key)
        };

        let rows = match self.transport.fetch_feed().await {
            Ok(rows) => rows,
            Err(err) => {
                self.write()?.loads.finish(&ticket);
                return Err(err.into());
            }
        };

        let changed = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            if !state.loads.finish(&ticket) {
                debug!(key = %key, rows = rows.len(), "discarding stale feed load");
                None
            } else {
                let rows: Vec<Report> = rows
                    .into_iter()
                    .filter(|r| !state.store.removed(EntityKind::Report, r.report_id.as_uuid()))
                    .collect();
                let ids: Vec<Uuid> = rows.iter().map(|r| r.report_id.as_uuid()).collect();
                let changes: Vec<StoreChange> = ids
                    .iter()
                    .map(|id| StoreChange::upserted(EntityKind::Report, *id))
                    .collect();
                for row in rows {
                    state.store.upsert_report(row.confirmed());
                }
                state.projections.materialize(key, ids);
                resort_projection(&mut state.projections, &key, &state.store);
                Some(changes)
            }
        };

        match changed {
            Some(changes) => {
                self.publish_all(changes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch one report's comment thread and materialize its projection.
    pub async fn refresh_comments(&self, report_id: ReportId) -> SyncResult<bool> {
        let key = ProjectionKey::CommentsFor(report_id);
        let ticket = {
            let mut state = self.write()?;
            state.loads.begin(key)
        };

        let rows = match self.transport.fetch_comments(report_id).await {
            Ok(rows) => rows,
            Err(err) => {
                self.write()?.loads.finish(&ticket);
                return Err(err.into());
            }
        };

        let changed = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            if !state.loads.finish(&ticket) {
                debug!(key = %key, rows = rows.len(), "discarding stale comments load");
                None
            } else {
                let rows: Vec<Comment> = rows
                    .into_iter()
                    .filter(|c| !state.store.removed(EntityKind::Comment, c.comment_id.as_uuid()))
                    .collect();
                let ids: Vec<Uuid> = rows.iter().map(|c| c.comment_id.as_uuid()).collect();
                let changes: Vec<StoreChange> = ids
                    .iter()
                    .map(|id| StoreChange::upserted(EntityKind::Comment, *id))
                    .collect();
                for row in rows {
                    state.store.upsert_comment(row.confirmed());
                }
                state.projections.materialize(key, ids);
                resort_projection(&mut state.projections, &key, &state.store);
                Some(changes)
            }
        };

        match changed {
            Some(changes) => {
                self.publish_all(changes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch one actor's badges and materialize their projection.
    pub async fn refresh_badges(&self, actor_id: ActorId) -> SyncResult<bool> {
        let key = ProjectionKey::BadgesFor(actor_id);
        let ticket = {
            let mut state = self.write()?;
            state.loads.begin(key)
        };

        let rows = match self.transport.fetch_badges(actor_id).await {
            Ok(rows) => rows,
            Err(err) => {
                self.write()?.loads.finish(&ticket);
                return Err(err.into());
            }
        };

        let changed = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            if !state.loads.finish(&ticket) {
                debug!(key = %key, rows = rows.len(), "discarding stale badges load");
                None
            } else {
                let rows: Vec<Badge> = rows
                    .into_iter()
                    .filter(|b| !state.store.removed(EntityKind::Badge, b.badge_id.as_uuid()))
                    .collect();
                let ids: Vec<Uuid> = rows.iter().map(|b| b.badge_id.as_uuid()).collect();
                let changes: Vec<StoreChange> = ids
                    .iter()
                    .map(|id| StoreChange::upserted(EntityKind::Badge, *id))
                    .collect();
                for row in rows {
                    state.store.upsert_badge(row.confirmed());
                }
                state.projections.materialize(key, ids);
                resort_projection(&mut state.projections, &key, &state.store);
                Some(changes)
            }
        };

        match changed {
            Some(changes) => {
                self.publish_all(changes);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_key() -> ProjectionKey {
        ProjectionKey::ReportFeed
    }

    #[test]
    fn test_ticket_current_without_invalidation() {
        let mut tracker = LoadTracker::new();
        let ticket = tracker.begin(feed_key());
        assert!(tracker.is_loading(&feed_key()));
        assert!(tracker.finish(&ticket));
        assert!(!tracker.is_loading(&feed_key()));
    }

    #[test]
    fn test_invalidate_makes_ticket_stale() {
        let mut tracker = LoadTracker::new();
        let ticket = tracker.begin(feed_key());
        tracker.invalidate(&feed_key());
        assert!(!tracker.finish(&ticket));
    }

    #[test]
    fn test_invalidate_clears_loading_mark() {
        let mut tracker = LoadTracker::new();
        let _ticket = tracker.begin(feed_key());
        tracker.invalidate(&feed_key());
        assert!(!tracker.is_loading(&feed_key()));
    }

    #[test]
    fn test_every_outstanding_ticket_goes_stale() {
        let mut tracker = LoadTracker::new();
        let first = tracker.begin(feed_key());
        let second = tracker.begin(feed_key());
        tracker.invalidate(&feed_key());
        assert!(!tracker.finish(&first));
        assert!(!tracker.finish(&second));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut tracker = LoadTracker::new();
        let feed = tracker.begin(feed_key());
        let comments = tracker.begin(ProjectionKey::CommentsFor(ReportId::generate()));
        tracker.invalidate(&feed_key());
        assert!(!tracker.finish(&feed));
        assert!(tracker.finish(&comments));
    }

    #[test]
    fn test_new_ticket_after_invalidation_is_current() {
        let mut tracker = LoadTracker::new();
        tracker.invalidate(&feed_key());
        let ticket = tracker.begin(feed_key());
        assert!(tracker.finish(&ticket));
    }
}
