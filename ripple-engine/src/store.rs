//! Entity store
//!
//! The type-partitioned local cache: one map per entity kind, keyed by
//! typed ID, holding exactly one record per entity. Projections reference
//! records by ID only, so whatever is in here IS the truth a UI renders.
//!
//! The store is a plain struct with no interior locking; the session facade
//! owns the one lock. Writes are synchronous: a read after `upsert` returns
//! sees the write, which is what makes optimistic apply "instant" for the
//! local actor.
//!
//! # Revisions
//!
//! Every write (upsert, patch, field mutation, remove) bumps a store-wide
//! clock and stamps the touched ID with the new value. Removal keeps the
//! stamp as a tombstone. The coordinator records the revision it produced at
//! optimistic apply; at commit time, a higher revision on the entity means a
//! realtime merge overtook the in-flight call, and the stale server echo is
//! dropped instead of resurrecting or rewinding the record.

use ripple_core::{
    Badge, BadgeId, Comment, CommentId, CommentPatch, EntityKind, Report, ReportId, ReportPatch,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-entity monotonic last-writer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// The local cache of feed entities.
#[derive(Debug, Default)]
pub struct EntityStore {
    reports: HashMap<ReportId, Report>,
    comments: HashMap<CommentId, Comment>,
    badges: HashMap<BadgeId, Badge>,
    revisions: HashMap<Uuid, Revision>,
    clock: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, id: Uuid) -> Revision {
        self.clock += 1;
        let revision = Revision(self.clock);
        self.revisions.insert(id, revision);
        revision
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub fn report(&self, id: &ReportId) -> Option<&Report> {
        self.reports.get(id)
    }

    /// Insert or replace the whole record.
    pub fn upsert_report(&mut self, report: Report) -> Revision {
        let id = report.report_id.as_uuid();
        self.reports.insert(report.report_id, report);
        self.bump(id)
    }

    /// Merge the patch's named fields into an existing record and refresh
    /// `updated_at`. An absent ID is a no-op: a patch never creates.
    pub fn patch_report(&mut self, id: &ReportId, patch: &ReportPatch) -> Option<Revision> {
        let report = self.reports.get_mut(id)?;
        patch.apply_to(report);
        report.updated_at = chrono::Utc::now();
        Some(self.bump(id.as_uuid()))
    }

    /// Mutate fields in place without timestamp maintenance. For engine
    /// internals only: counter propagation and rollback restores, which must
    /// control every byte they write.
    pub(crate) fn with_report_mut(
        &mut self,
        id: &ReportId,
        f: impl FnOnce(&mut Report),
    ) -> Option<Revision> {
        let report = self.reports.get_mut(id)?;
        f(report);
        Some(self.bump(id.as_uuid()))
    }

    /// Remove and return the record, leaving a revision tombstone.
    pub fn remove_report(&mut self, id: &ReportId) -> Option<Report> {
        let report = self.reports.remove(id)?;
        self.bump(id.as_uuid());
        Some(report)
    }

    // ========================================================================
    // COMMENTS
    // ========================================================================

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.get(id)
    }

    pub fn upsert_comment(&mut self, comment: Comment) -> Revision {
        let id = comment.comment_id.as_uuid();
        self.comments.insert(comment.comment_id, comment);
        self.bump(id)
    }

    pub fn patch_comment(&mut self, id: &CommentId, patch: &CommentPatch) -> Option<Revision> {
        let comment = self.comments.get_mut(id)?;
        patch.apply_to(comment);
        comment.updated_at = chrono::Utc::now();
        Some(self.bump(id.as_uuid()))
    }

    pub(crate) fn with_comment_mut(
        &mut self,
        id: &CommentId,
        f: impl FnOnce(&mut Comment),
    ) -> Option<Revision> {
        let comment = self.comments.get_mut(id)?;
        f(comment);
        Some(self.bump(id.as_uuid()))
    }

    pub fn remove_comment(&mut self, id: &CommentId) -> Option<Comment> {
        let comment = self.comments.remove(id)?;
        self.bump(id.as_uuid());
        Some(comment)
    }

    // ========================================================================
    // BADGES
    // ========================================================================

    pub fn badge(&self, id: &BadgeId) -> Option<&Badge> {
        self.badges.get(id)
    }

    pub fn upsert_badge(&mut self, badge: Badge) -> Revision {
        let id = badge.badge_id.as_uuid();
        self.badges.insert(badge.badge_id, badge);
        self.bump(id)
    }

    pub fn remove_badge(&mut self, id: &BadgeId) -> Option<Badge> {
        let badge = self.badges.remove(id)?;
        self.bump(id.as_uuid());
        Some(badge)
    }

    // ========================================================================
    // KIND-GENERIC HELPERS
    // ========================================================================

    pub fn contains(&self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::Report => self.reports.contains_key(&ReportId::new(id)),
            EntityKind::Comment => self.comments.contains_key(&CommentId::new(id)),
            EntityKind::Badge => self.badges.contains_key(&BadgeId::new(id)),
        }
    }

    /// `None` when the entity is not cached.
    pub fn speculative(&self, kind: EntityKind, id: Uuid) -> Option<bool> {
        match kind {
            EntityKind::Report => self.reports.get(&ReportId::new(id)).map(|r| r.speculative),
            EntityKind::Comment => self.comments.get(&CommentId::new(id)).map(|c| c.speculative),
            EntityKind::Badge => self.badges.get(&BadgeId::new(id)).map(|b| b.speculative),
        }
    }

    /// Remove whatever record holds this ID. Used by the reconciler for
    /// `deleted` events, where only (kind, id) is known.
    pub fn remove(&mut self, kind: EntityKind, id: Uuid) -> bool {
        match kind {
            EntityKind::Report => self.remove_report(&ReportId::new(id)).is_some(),
            EntityKind::Comment => self.remove_comment(&CommentId::new(id)).is_some(),
            EntityKind::Badge => self.remove_badge(&BadgeId::new(id)).is_some(),
        }
    }

    /// Whether this ID was removed: a revision tombstone exists but no
    /// record does. Echoes and stale fetch rows for such an ID must not be
    /// applied, or the removal would silently un-happen.
    pub fn removed(&self, kind: EntityKind, id: Uuid) -> bool {
        self.revisions.contains_key(&id) && !self.contains(kind, id)
    }

    pub fn revision_of(&self, id: Uuid) -> Option<Revision> {
        self.revisions.get(&id).copied()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Report => self.reports.len(),
            EntityKind::Comment => self.comments.len(),
            EntityKind::Badge => self.badges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty() && self.comments.is_empty() && self.badges.is_empty()
    }

    /// Drop everything, tombstones included. Session logout.
    pub fn clear(&mut self) {
        self.reports.clear();
        self.comments.clear();
        self.badges.clear();
        self.revisions.clear();
        self.clock = 0;
    }
}

// =============================================================================
// TESTS
// =============================================================================
