//! Projection ordering
//!
//! Comparators resolve IDs against the store at sort time; a projection
//! never caches sort keys. Ordering is recomputed on every structural
//! change, so "prepend then resort" is the contract for optimistic inserts:
//! the new entry lands wherever the comparator puts it, not at slot 0.
//!
//! Rules:
//! - Comments: pinned band first, ranked by most recent pin-or-update,
//!   newest first; then unpinned by creation time, newest first.
//! - Report feed: pinned band first by update time, then unpinned by
//!   creation time, newest first.
//! - Badges: award time, newest first.
//! - IDs missing from the store sort last (stale entries awaiting purge).
//! - Final tie-break on the ID itself (v7 IDs are time-ordered), so sorts
//!   are deterministic even with equal timestamps.

use crate::projection::{ListProjections, ProjectionKey};
use crate::store::EntityStore;
use ripple_core::{BadgeId, CommentId, ReportId};
use std::cmp::Ordering;
use uuid::Uuid;

/// Re-sort one projection with the comparator that belongs to its key.
pub fn resort_projection(
    projections: &mut ListProjections,
    key: &ProjectionKey,
    store: &EntityStore,
) {
    match key {
        ProjectionKey::ReportFeed => projections.resort(key, |a, b| feed_cmp(store, a, b)),
        ProjectionKey::CommentsFor(_) => projections.resort(key, |a, b| comment_cmp(store, a, b)),
        ProjectionKey::BadgesFor(_) => projections.resort(key, |a, b| badge_cmp(store, a, b)),
    }
}

/// Comment ordering: pinned (most recent pin-or-update first), then
/// unpinned (newest first).
pub fn comment_cmp(store: &EntityStore, a: &Uuid, b: &Uuid) -> Ordering {
    let left = store.comment(&CommentId::new(*a));
    let right = store.comment(&CommentId::new(*b));
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.pinned, y.pinned) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => y.pin_rank().cmp(&x.pin_rank()).then(b.cmp(a)),
            (false, false) => y.created_at.cmp(&x.created_at).then(b.cmp(a)),
        },
    }
}

/// Report feed ordering: pinned (most recently updated first), then
/// unpinned (newest first).
pub fn feed_cmp(store: &EntityStore, a: &Uuid, b: &Uuid) -> Ordering {
    let left = store.report(&ReportId::new(*a));
    let right = store.report(&ReportId::new(*b));
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.pinned, y.pinned) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => y.updated_at.cmp(&x.updated_at).then(b.cmp(a)),
            (false, false) => y.created_at.cmp(&x.created_at).then(b.cmp(a)),
        },
    }
}

/// Badge ordering: newest award first.
pub fn badge_cmp(store: &EntityStore, a: &Uuid, b: &Uuid) -> Ordering {
    let left = store.badge(&BadgeId::new(*a));
    let right = store.badge(&BadgeId::new(*b));
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.awarded_at.cmp(&x.awarded_at).then(b.cmp(a)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
