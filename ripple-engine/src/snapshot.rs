//! Rollback plans
//!
//! A mutation snapshots itself as the structural inverse of its own
//! optimistic apply: remove what was added, reinsert what was removed,
//! revert exactly the fields that were touched, invert the counter delta.
//! Executing the plan with no interleaving restores pre-mutation state
//! byte-for-byte (order included, since order is always comparator-derived).
//! Under interleaving, the inverse composes: rolling back a like toggle
//! does not clobber a concurrent body edit, and rolling back a create does
//! not erase a comment a realtime event added next to it.

use crate::changes::StoreChange;
use crate::counters;
use crate::ordering::resort_projection;
use crate::projection::{ListProjections, ProjectionKey};
use crate::store::EntityStore;
use ripple_core::{
    Comment, CommentId, CommentPatch, CounterDelta, EntityKind, Report, ReportId, ReportPatch,
    Timestamp,
};
use tracing::debug;
use uuid::Uuid;

/// Inverse of the store write.
#[derive(Debug)]
pub(crate) enum StoreUndo {
    /// Undo a create: the record did not exist before.
    RemoveReport(ReportId),
    RemoveComment(CommentId),
    /// Undo a delete: reinsert the exact prior record.
    InsertReport(Box<Report>),
    InsertComment(Box<Comment>),
    /// Undo an update or toggle: write back prior values of exactly the
    /// touched fields, plus the prior `updated_at`.
    RevertReport {
        id: ReportId,
        prior: ReportPatch,
        updated_at: Timestamp,
    },
    RevertComment {
        id: CommentId,
        prior: CommentPatch,
        updated_at: Timestamp,
    },
}

/// Inverse of one projection adjustment.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ProjectionUndo {
    /// Undo an insert/prepend.
    Remove { key: ProjectionKey, id: Uuid },
    /// Undo a purge; position is restored by the resort.
    Reinsert { key: ProjectionKey, id: Uuid },
}

/// Everything needed to unwind one optimistic apply.
#[derive(Debug)]
pub(crate) struct RollbackPlan {
    pub store: StoreUndo,
    pub projections: Vec<ProjectionUndo>,
    /// The delta that WAS applied; execution applies its inverse.
    pub counter: Option<CounterDelta>,
    /// Keys whose sort keys the apply may have moved (beyond the ones the
    /// projection undos already touch).
    pub resort_keys: Vec<ProjectionKey>,
}

impl RollbackPlan {
    pub(crate) fn execute(
        self,
        store: &mut EntityStore,
        projections: &mut ListProjections,
    ) -> Vec<StoreChange> {
        let mut changes = Vec::new();
        let mut resort: Vec<ProjectionKey> = self.resort_keys;

        match self.store {
            StoreUndo::RemoveReport(id) => {
                if store.remove_report(&id).is_some() {
                    changes.push(StoreChange::removed(EntityKind::Report, id.as_uuid()));
                }
            }
            StoreUndo::RemoveComment(id) => {
                if store.remove_comment(&id).is_some() {
                    changes.push(StoreChange::removed(EntityKind::Comment, id.as_uuid()));
                }
            }
            StoreUndo::InsertReport(report) => {
                let id = report.report_id.as_uuid();
                store.upsert_report(*report);
                changes.push(StoreChange::upserted(EntityKind::Report, id));
            }
            StoreUndo::InsertComment(comment) => {
                let id = comment.comment_id.as_uuid();
                store.upsert_comment(*comment);
                changes.push(StoreChange::upserted(EntityKind::Comment, id));
            }
            StoreUndo::RevertReport {
                id,
                prior,
                updated_at,
            } => {
                let reverted = store.with_report_mut(&id, |report| {
                    prior.apply_to(report);
                    report.updated_at = updated_at;
                });
                if reverted.is_some() {
                    changes.push(StoreChange::upserted(EntityKind::Report, id.as_uuid()));
                }
            }
            StoreUndo::RevertComment {
                id,
                prior,
                updated_at,
            } => {
                let reverted = store.with_comment_mut(&id, |comment| {
                    prior.apply_to(comment);
                    comment.updated_at = updated_at;
                });
                if reverted.is_some() {
                    changes.push(StoreChange::upserted(EntityKind::Comment, id.as_uuid()));
                }
            }
        }

        if let Some(delta) = self.counter {
            let inverse = delta.inverted();
            if let Err(err) = counters::apply(store, &inverse) {
                // the counter carrier can legitimately be gone (realtime
                // deleted it mid-flight); there is nothing left to restore
                debug!(delta = %inverse, %err, "counter undo skipped");
            } else {
                changes.push(StoreChange::upserted(delta.kind, delta.id));
            }
        }

        for undo in self.projections {
            match undo {
                ProjectionUndo::Remove { key, id } => {
                    projections.remove(&key, id);
                    resort.push(key);
                }
                ProjectionUndo::Reinsert { key, id } => {
                    projections.insert(key, id);
                    resort.push(key);
                }
            }
        }
        resort.sort_by_key(|k| k.to_string());
        resort.dedup();
        for key in resort {
            resort_projection(projections, &key, store);
        }

        changes
    }
}

/// Prior-values patch for a report: captures the current value of exactly
/// the fields `touched` names.
pub(crate) fn report_prior(report: &Report, touched: &ReportPatch) -> ReportPatch {
    ReportPatch {
        title: touched.title.as_ref().map(|_| report.title.clone()),
        body: touched.body.as_ref().map(|_| report.body.clone()),
        category: touched.category.map(|_| report.category),
        status: touched.status.map(|_| report.status),
        resolved_at: touched.resolved_at.map(|_| report.resolved_at),
        pinned: touched.pinned.map(|_| report.pinned),
        upvoted: touched.upvoted.map(|_| report.upvoted),
        flagged: touched.flagged.map(|_| report.flagged),
    }
}

/// Prior-values patch for a comment.
pub(crate) fn comment_prior(comment: &Comment, touched: &CommentPatch) -> CommentPatch {
    CommentPatch {
        body: touched.body.as_ref().map(|_| comment.body.clone()),
        pinned: touched.pinned.map(|_| comment.pinned),
        pinned_at: touched.pinned_at.map(|_| comment.pinned_at),
        liked: touched.liked.map(|_| comment.liked),
    }
}

// =============================================================================
// TESTS
// =============================================================================
