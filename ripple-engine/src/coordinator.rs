//! Mutation coordinator
//!
//! Every local write runs the same lifecycle:
//!
//! ```text
//! Idle -> IdentityChecked -> Snapshotted -> OptimisticallyApplied
//!      -> Committed | RolledBack
//! ```
//!
//! Phases 2-4 (pending-write registration, snapshot, optimistic apply) run
//! inside one lock scope, so a read from the same session either sees none
//! of the mutation or all of it. The lock is released for the single
//! transport call and re-acquired to commit the authoritative response or
//! execute the rollback plan. Change events and the counters hook go out
//! only after the lock is back down.
//!
//! Writes to a target whose own create is still in flight never reach the
//! network; see the `race` module.

use crate::changes::StoreChange;
use crate::counters;
use crate::engine::SessionEngine;
use crate::ordering::resort_projection;
use crate::projection::ProjectionKey;
use crate::race;
use crate::snapshot::{self, ProjectionUndo, RollbackPlan, StoreUndo};
use crate::store::Revision;
use chrono::Utc;
use ripple_core::{
    Comment, CommentDraft, CommentId, CommentPatch, CounterDelta, CounterField, EntityKind,
    FeedOp, MutationError, Report, ReportDraft, ReportId, ReportPatch, SyncResult,
};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

// =============================================================================
// VOCABULARY
// =============================================================================

/// The slice of an entity an in-flight optimistic write owns. Two writes to
/// the same entity conflict only when they claim the same slice; a like and
/// a body edit on one comment may fly together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSet {
    /// Creation or deletion of the record itself.
    Existence,
    /// Content fields driven by a patch.
    Content,
    LikeState,
    PinState,
    UpvoteState,
    FlagState,
}

/// Registry of in-flight optimistic writes, keyed by (entity, field-set).
#[derive(Debug, Default)]
pub struct PendingWrites {
    in_flight: HashSet<(Uuid, FieldSet)>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        kind: EntityKind,
        id: Uuid,
        fields: FieldSet,
    ) -> Result<(), MutationError> {
        if !self.in_flight.insert((id, fields)) {
            return Err(MutationError::WriteInFlight { kind, id });
        }
        Ok(())
    }

    pub(crate) fn release(&mut self, id: Uuid, fields: FieldSet) {
        self.in_flight.remove(&(id, fields));
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Where in the lifecycle a mutation currently is; carried as a tracing
/// field so the lifecycle is observable without a debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    IdentityChecked,
    Snapshotted,
    OptimisticallyApplied,
    Committed,
    RolledBack,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationPhase::Idle => "idle",
            MutationPhase::IdentityChecked => "identity-checked",
            MutationPhase::Snapshotted => "snapshotted",
            MutationPhase::OptimisticallyApplied => "optimistically-applied",
            MutationPhase::Committed => "committed",
            MutationPhase::RolledBack => "rolled-back",
        })
    }
}

/// How a mutation concluded. `RaceSkipped` is a success: the target's own
/// create was still in flight, so the write settled locally and never went
/// to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    Committed(T),
    RaceSkipped(T),
}

impl<T> MutationOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            MutationOutcome::Committed(value) | MutationOutcome::RaceSkipped(value) => value,
        }
    }

    pub fn is_race_skipped(&self) -> bool {
        matches!(self, MutationOutcome::RaceSkipped(_))
    }
}

fn trace_phase(op: FeedOp, kind: EntityKind, id: Uuid, phase: MutationPhase) {
    debug!(op = %op, kind = %kind, id = %id, phase = %phase, "mutation");
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl SessionEngine {
    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Propose a new report. The client chooses the stable ID; the server
    /// must accept and persist it, so commit is an in-place overwrite.
    pub async fn create_report(&self, draft: ReportDraft) -> SyncResult<Report> {
        let op = FeedOp::CreateReport;
        let identity = self.gate.ensure_writable()?;
        let report = Report::speculative(draft, &identity);
        let id = report.report_id;
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::IdentityChecked);

        let (applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            state
                .pending
                .register(EntityKind::Report, id.as_uuid(), FieldSet::Existence)?;
            let key = ProjectionKey::ReportFeed;
            state.loads.invalidate(&key);
            state.store.upsert_report(report.clone());
            let inserted = state.projections.prepend(key, id.as_uuid());
            if inserted {
                resort_projection(&mut state.projections, &key, &state.store);
            }
            let plan = RollbackPlan {
                store: StoreUndo::RemoveReport(id),
                projections: if inserted {
                    vec![ProjectionUndo::Remove {
                        key,
                        id: id.as_uuid(),
                    }]
                } else {
                    Vec::new()
                },
                counter: None,
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Snapshotted);
            (state.store.revision_of(id.as_uuid()), plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Report,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.create_report(&report).await {
            Ok(server) => Ok(self.commit_report(op, id, FieldSet::Existence, applied, server)?),
            Err(err) => {
                self.roll_back(op, EntityKind::Report, id.as_uuid(), FieldSet::Existence, plan)?;
                Err(err.into())
            }
        }
    }

    /// Edit a report's content fields.
    pub async fn update_report(
        &self,
        id: ReportId,
        patch: ReportPatch,
    ) -> SyncResult<MutationOutcome<Report>> {
        let op = FeedOp::UpdateReport;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::IdentityChecked);

        let (applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.report(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: id.as_uuid(),
                }
                .into());
            };
            if current.speculative {
                let Some((report, changes)) = race::update_report_locally(state, id, &patch)
                else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Report,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(report));
            }
            let prior = snapshot::report_prior(current, &patch);
            let prior_updated_at = current.updated_at;
            state
                .pending
                .register(EntityKind::Report, id.as_uuid(), FieldSet::Content)?;
            let key = ProjectionKey::ReportFeed;
            state.loads.invalidate(&key);
            let applied = state.store.patch_report(&id, &patch);
            resort_projection(&mut state.projections, &key, &state.store);
            let plan = RollbackPlan {
                store: StoreUndo::RevertReport {
                    id,
                    prior,
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: None,
                resort_keys: vec![key],
            };
            trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Snapshotted);
            (applied, plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Report,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.update_report(id, &patch).await {
            Ok(server) => Ok(MutationOutcome::Committed(self.commit_report(
                op,
                id,
                FieldSet::Content,
                applied,
                server,
            )?)),
            Err(err) => {
                self.roll_back(op, EntityKind::Report, id.as_uuid(), FieldSet::Content, plan)?;
                Err(err.into())
            }
        }
    }

    /// Delete a report. The snapshot keeps the full prior record so a
    /// rejection can reinsert it, order included.
    pub async fn delete_report(&self, id: ReportId) -> SyncResult<MutationOutcome<()>> {
        let op = FeedOp::DeleteReport;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::IdentityChecked);

        let plan = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.report(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: id.as_uuid(),
                }
                .into());
            };
            if current.speculative {
                let changes = race::delete_report_locally(state, id);
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(()));
            }
            state
                .pending
                .register(EntityKind::Report, id.as_uuid(), FieldSet::Existence)?;
            let Some(prior) = state.store.remove_report(&id) else {
                state.pending.release(id.as_uuid(), FieldSet::Existence);
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: id.as_uuid(),
                }
                .into());
            };
            let purged = state.projections.purge(id.as_uuid());
            for key in &purged {
                state.loads.invalidate(key);
            }
            let plan = RollbackPlan {
                store: StoreUndo::InsertReport(Box::new(prior)),
                projections: purged
                    .into_iter()
                    .map(|key| ProjectionUndo::Reinsert {
                        key,
                        id: id.as_uuid(),
                    })
                    .collect(),
                counter: None,
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Snapshotted);
            plan
        };
        self.publish_all(vec![StoreChange::removed(EntityKind::Report, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Report,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.delete_report(id).await {
            Ok(()) => {
                self.commit_delete(op, EntityKind::Report, id.as_uuid(), FieldSet::Existence)?;
                Ok(MutationOutcome::Committed(()))
            }
            Err(err) => {
                self.roll_back(op, EntityKind::Report, id.as_uuid(), FieldSet::Existence, plan)?;
                Err(err.into())
            }
        }
    }

    /// Flip the session actor's upvote on a report. Flag and counter move
    /// as one atomic step; the wire carries the desired absolute state.
    pub async fn toggle_report_upvote(&self, id: ReportId) -> SyncResult<MutationOutcome<Report>> {
        let op = FeedOp::SetReportUpvote;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::IdentityChecked);

        let (desired, applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.report(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: id.as_uuid(),
                }
                .into());
            };
            let desired = !current.upvoted;
            let prior_updated_at = current.updated_at;
            let delta = CounterDelta::new(
                EntityKind::Report,
                id.as_uuid(),
                CounterField::Upvotes,
                if desired { 1 } else { -1 },
            );
            if current.speculative {
                let Some((report, changes)) =
                    race::toggle_report_locally(state, id, |r| r.upvoted = desired, Some(delta))
                else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Report,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(report));
            }
            state
                .pending
                .register(EntityKind::Report, id.as_uuid(), FieldSet::UpvoteState)?;
            if let Err(err) = counters::apply(&mut state.store, &delta) {
                state.pending.release(id.as_uuid(), FieldSet::UpvoteState);
                return Err(err.into());
            }
            state.loads.invalidate(&ProjectionKey::ReportFeed);
            state.store.with_report_mut(&id, |r| r.upvoted = desired);
            let plan = RollbackPlan {
                store: StoreUndo::RevertReport {
                    id,
                    prior: ReportPatch {
                        upvoted: Some(!desired),
                        ..Default::default()
                    },
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: Some(delta),
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Snapshotted);
            (desired, state.store.revision_of(id.as_uuid()), plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Report,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.set_report_upvote(id, desired).await {
            Ok(server) => {
                let report =
                    self.commit_report(op, id, FieldSet::UpvoteState, applied, server)?;
                self.spawn_counter_hook(EntityKind::Report, id.as_uuid());
                Ok(MutationOutcome::Committed(report))
            }
            Err(err) => {
                self.roll_back(
                    op,
                    EntityKind::Report,
                    id.as_uuid(),
                    FieldSet::UpvoteState,
                    plan,
                )?;
                Err(err.into())
            }
        }
    }

    /// Flip the session actor's flag ("needs moderator attention") on a
    /// report. No counter rides along.
    pub async fn toggle_report_flag(&self, id: ReportId) -> SyncResult<MutationOutcome<Report>> {
        let op = FeedOp::SetReportFlag;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::IdentityChecked);

        let (desired, applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.report(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: id.as_uuid(),
                }
                .into());
            };
            let desired = !current.flagged;
            let prior_updated_at = current.updated_at;
            if current.speculative {
                let Some((report, changes)) =
                    race::toggle_report_locally(state, id, |r| r.flagged = desired, None)
                else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Report,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(report));
            }
            state
                .pending
                .register(EntityKind::Report, id.as_uuid(), FieldSet::FlagState)?;
            state.loads.invalidate(&ProjectionKey::ReportFeed);
            state.store.with_report_mut(&id, |r| r.flagged = desired);
            let plan = RollbackPlan {
                store: StoreUndo::RevertReport {
                    id,
                    prior: ReportPatch {
                        flagged: Some(!desired),
                        ..Default::default()
                    },
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: None,
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Snapshotted);
            (desired, state.store.revision_of(id.as_uuid()), plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Report,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.set_report_flag(id, desired).await {
            Ok(server) => Ok(MutationOutcome::Committed(self.commit_report(
                op,
                id,
                FieldSet::FlagState,
                applied,
                server,
            )?)),
            Err(err) => {
                self.roll_back(
                    op,
                    EntityKind::Report,
                    id.as_uuid(),
                    FieldSet::FlagState,
                    plan,
                )?;
                Err(err.into())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------------

    /// Propose a new comment under a report (optionally threaded beneath a
    /// parent comment). Bumps the report's `comments_count` optimistically.
    pub async fn create_comment(&self, draft: CommentDraft) -> SyncResult<Comment> {
        let op = FeedOp::CreateComment;
        let identity = self.gate.ensure_writable()?;
        let report_id = draft.report_id;

        let (comment, applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(parent) = state.store.report(&report_id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Report,
                    id: report_id.as_uuid(),
                }
                .into());
            };
            let is_owner = parent.author.actor_id == identity.actor_id;
            let comment = Comment::speculative(draft, &identity, is_owner);
            let id = comment.comment_id;
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::IdentityChecked);
            state
                .pending
                .register(EntityKind::Comment, id.as_uuid(), FieldSet::Existence)?;
            let delta = CounterDelta::new(
                EntityKind::Report,
                report_id.as_uuid(),
                CounterField::Comments,
                1,
            );
            if let Err(err) = counters::apply(&mut state.store, &delta) {
                state.pending.release(id.as_uuid(), FieldSet::Existence);
                return Err(err.into());
            }
            let key = ProjectionKey::CommentsFor(report_id);
            state.loads.invalidate(&key);
            state.store.upsert_comment(comment.clone());
            let inserted = state.projections.prepend(key, id.as_uuid());
            if inserted {
                resort_projection(&mut state.projections, &key, &state.store);
            }
            let plan = RollbackPlan {
                store: StoreUndo::RemoveComment(id),
                projections: if inserted {
                    vec![ProjectionUndo::Remove {
                        key,
                        id: id.as_uuid(),
                    }]
                } else {
                    Vec::new()
                },
                counter: Some(delta),
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Snapshotted);
            (comment, state.store.revision_of(id.as_uuid()), plan)
        };
        let id = comment.comment_id;
        self.publish_all(vec![
            StoreChange::upserted(EntityKind::Comment, id.as_uuid()),
            StoreChange::upserted(EntityKind::Report, report_id.as_uuid()),
        ]);
        trace_phase(
            op,
            EntityKind::Comment,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.create_comment(&comment).await {
            Ok(server) => {
                let committed =
                    self.commit_comment(op, id, FieldSet::Existence, applied, server)?;
                self.spawn_counter_hook(EntityKind::Report, report_id.as_uuid());
                Ok(committed)
            }
            Err(err) => {
                self.roll_back(op, EntityKind::Comment, id.as_uuid(), FieldSet::Existence, plan)?;
                Err(err.into())
            }
        }
    }

    /// Edit a comment's body.
    pub async fn update_comment(
        &self,
        id: CommentId,
        patch: CommentPatch,
    ) -> SyncResult<MutationOutcome<Comment>> {
        let op = FeedOp::UpdateComment;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::IdentityChecked);

        let (applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.comment(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Comment,
                    id: id.as_uuid(),
                }
                .into());
            };
            if current.speculative {
                let Some((comment, changes)) = race::update_comment_locally(state, id, &patch)
                else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Comment,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(comment));
            }
            let prior = snapshot::comment_prior(current, &patch);
            let prior_updated_at = current.updated_at;
            let key = ProjectionKey::CommentsFor(current.report_id);
            state
                .pending
                .register(EntityKind::Comment, id.as_uuid(), FieldSet::Content)?;
            state.loads.invalidate(&key);
            let applied = state.store.patch_comment(&id, &patch);
            resort_projection(&mut state.projections, &key, &state.store);
            let plan = RollbackPlan {
                store: StoreUndo::RevertComment {
                    id,
                    prior,
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: None,
                resort_keys: vec![key],
            };
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Snapshotted);
            (applied, plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Comment,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.update_comment(id, &patch).await {
            Ok(server) => Ok(MutationOutcome::Committed(self.commit_comment(
                op,
                id,
                FieldSet::Content,
                applied,
                server,
            )?)),
            Err(err) => {
                self.roll_back(op, EntityKind::Comment, id.as_uuid(), FieldSet::Content, plan)?;
                Err(err.into())
            }
        }
    }

    /// Delete a comment; decrements the report's `comments_count`.
    pub async fn delete_comment(&self, id: CommentId) -> SyncResult<MutationOutcome<()>> {
        let op = FeedOp::DeleteComment;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::IdentityChecked);

        let (report_id, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.comment(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Comment,
                    id: id.as_uuid(),
                }
                .into());
            };
            let report_id = current.report_id;
            if current.speculative {
                let changes = race::delete_comment_locally(state, id);
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(()));
            }
            state
                .pending
                .register(EntityKind::Comment, id.as_uuid(), FieldSet::Existence)?;
            let Some(prior) = state.store.remove_comment(&id) else {
                state.pending.release(id.as_uuid(), FieldSet::Existence);
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Comment,
                    id: id.as_uuid(),
                }
                .into());
            };
            let purged = state.projections.purge(id.as_uuid());
            for key in &purged {
                state.loads.invalidate(key);
            }
            let delta = CounterDelta::new(
                EntityKind::Report,
                report_id.as_uuid(),
                CounterField::Comments,
                -1,
            );
            // the parent may already be gone (realtime delete); the comment
            // removal itself still stands
            let counter = match counters::apply(&mut state.store, &delta) {
                Ok(_) => Some(delta),
                Err(err) => {
                    debug!(delta = %delta, %err, "parent counter skipped");
                    None
                }
            };
            let plan = RollbackPlan {
                store: StoreUndo::InsertComment(Box::new(prior)),
                projections: purged
                    .into_iter()
                    .map(|key| ProjectionUndo::Reinsert {
                        key,
                        id: id.as_uuid(),
                    })
                    .collect(),
                counter,
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Snapshotted);
            (report_id, plan)
        };
        self.publish_all(vec![
            StoreChange::removed(EntityKind::Comment, id.as_uuid()),
            StoreChange::upserted(EntityKind::Report, report_id.as_uuid()),
        ]);
        trace_phase(
            op,
            EntityKind::Comment,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.delete_comment(id).await {
            Ok(()) => {
                self.commit_delete(op, EntityKind::Comment, id.as_uuid(), FieldSet::Existence)?;
                self.spawn_counter_hook(EntityKind::Report, report_id.as_uuid());
                Ok(MutationOutcome::Committed(()))
            }
            Err(err) => {
                self.roll_back(op, EntityKind::Comment, id.as_uuid(), FieldSet::Existence, plan)?;
                Err(err.into())
            }
        }
    }

    /// Flip the session actor's like on a comment. Flag and `like_count`
    /// move as one atomic step.
    pub async fn toggle_comment_like(&self, id: CommentId) -> SyncResult<MutationOutcome<Comment>> {
        let op = FeedOp::SetCommentLike;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::IdentityChecked);

        let (desired, applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.comment(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Comment,
                    id: id.as_uuid(),
                }
                .into());
            };
            let desired = !current.liked;
            let prior_updated_at = current.updated_at;
            let key = ProjectionKey::CommentsFor(current.report_id);
            let delta = CounterDelta::new(
                EntityKind::Comment,
                id.as_uuid(),
                CounterField::Likes,
                if desired { 1 } else { -1 },
            );
            if current.speculative {
                let Some((comment, changes)) =
                    race::toggle_comment_locally(state, id, |c| c.liked = desired, Some(delta))
                else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Comment,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(comment));
            }
            state
                .pending
                .register(EntityKind::Comment, id.as_uuid(), FieldSet::LikeState)?;
            if let Err(err) = counters::apply(&mut state.store, &delta) {
                state.pending.release(id.as_uuid(), FieldSet::LikeState);
                return Err(err.into());
            }
            state.loads.invalidate(&key);
            state.store.with_comment_mut(&id, |c| c.liked = desired);
            let plan = RollbackPlan {
                store: StoreUndo::RevertComment {
                    id,
                    prior: CommentPatch {
                        liked: Some(!desired),
                        ..Default::default()
                    },
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: Some(delta),
                resort_keys: Vec::new(),
            };
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Snapshotted);
            (desired, state.store.revision_of(id.as_uuid()), plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Comment,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.set_comment_like(id, desired).await {
            Ok(server) => {
                let comment =
                    self.commit_comment(op, id, FieldSet::LikeState, applied, server)?;
                self.spawn_counter_hook(EntityKind::Comment, id.as_uuid());
                Ok(MutationOutcome::Committed(comment))
            }
            Err(err) => {
                self.roll_back(op, EntityKind::Comment, id.as_uuid(), FieldSet::LikeState, plan)?;
                Err(err.into())
            }
        }
    }

    /// Pin or unpin a comment at the top of its thread. Pinned comments
    /// sort before unpinned ones, most recently pinned first.
    pub async fn toggle_comment_pin(&self, id: CommentId) -> SyncResult<MutationOutcome<Comment>> {
        let op = FeedOp::SetCommentPin;
        self.gate.ensure_writable()?;
        trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::IdentityChecked);

        let (desired, applied, plan) = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            let Some(current) = state.store.comment(&id) else {
                return Err(MutationError::MissingTarget {
                    kind: EntityKind::Comment,
                    id: id.as_uuid(),
                }
                .into());
            };
            let desired = !current.pinned;
            let pin_time = if desired { Some(Utc::now()) } else { None };
            let prior = CommentPatch {
                pinned: Some(current.pinned),
                pinned_at: Some(current.pinned_at),
                ..Default::default()
            };
            let prior_updated_at = current.updated_at;
            let key = ProjectionKey::CommentsFor(current.report_id);
            if current.speculative {
                let Some((comment, changes)) = race::toggle_comment_locally(
                    state,
                    id,
                    |c| {
                        c.pinned = desired;
                        c.pinned_at = pin_time;
                    },
                    None,
                ) else {
                    return Err(MutationError::MissingTarget {
                        kind: EntityKind::Comment,
                        id: id.as_uuid(),
                    }
                    .into());
                };
                drop(guard);
                self.publish_all(changes);
                return Ok(MutationOutcome::RaceSkipped(comment));
            }
            state
                .pending
                .register(EntityKind::Comment, id.as_uuid(), FieldSet::PinState)?;
            state.loads.invalidate(&key);
            state.store.with_comment_mut(&id, |c| {
                c.pinned = desired;
                c.pinned_at = pin_time;
            });
            resort_projection(&mut state.projections, &key, &state.store);
            let plan = RollbackPlan {
                store: StoreUndo::RevertComment {
                    id,
                    prior,
                    updated_at: prior_updated_at,
                },
                projections: Vec::new(),
                counter: None,
                resort_keys: vec![key],
            };
            trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Snapshotted);
            (desired, state.store.revision_of(id.as_uuid()), plan)
        };
        self.publish_all(vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())]);
        trace_phase(
            op,
            EntityKind::Comment,
            id.as_uuid(),
            MutationPhase::OptimisticallyApplied,
        );

        match self.transport.set_comment_pin(id, desired).await {
            Ok(server) => Ok(MutationOutcome::Committed(self.commit_comment(
                op,
                id,
                FieldSet::PinState,
                applied,
                server,
            )?)),
            Err(err) => {
                self.roll_back(op, EntityKind::Comment, id.as_uuid(), FieldSet::PinState, plan)?;
                Err(err.into())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Commit / rollback
    // ------------------------------------------------------------------------

    fn commit_report(
        &self,
        op: FeedOp,
        id: ReportId,
        fields: FieldSet,
        applied: Option<Revision>,
        server: Report,
    ) -> Result<Report, MutationError> {
        let server = server.confirmed();
        let changes = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            state.pending.release(id.as_uuid(), fields);
            if state.store.revision_of(id.as_uuid()) != applied {
                // a realtime merge overtook the in-flight call; the later
                // writer already won
                debug!(op = %op, kind = %EntityKind::Report, id = %id, "dropping stale server echo");
                Vec::new()
            } else {
                state.store.upsert_report(server.clone());
                let key = ProjectionKey::ReportFeed;
                resort_projection(&mut state.projections, &key, &state.store);
                vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())]
            }
        };
        self.publish_all(changes);
        trace_phase(op, EntityKind::Report, id.as_uuid(), MutationPhase::Committed);
        Ok(server)
    }

    fn commit_comment(
        &self,
        op: FeedOp,
        id: CommentId,
        fields: FieldSet,
        applied: Option<Revision>,
        server: Comment,
    ) -> Result<Comment, MutationError> {
        let server = server.confirmed();
        let changes = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            state.pending.release(id.as_uuid(), fields);
            if state.store.revision_of(id.as_uuid()) != applied {
                debug!(op = %op, kind = %EntityKind::Comment, id = %id, "dropping stale server echo");
                Vec::new()
            } else {
                let key = ProjectionKey::CommentsFor(server.report_id);
                state.store.upsert_comment(server.clone());
                resort_projection(&mut state.projections, &key, &state.store);
                vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())]
            }
        };
        self.publish_all(changes);
        trace_phase(op, EntityKind::Comment, id.as_uuid(), MutationPhase::Committed);
        Ok(server)
    }

    fn commit_delete(
        &self,
        op: FeedOp,
        kind: EntityKind,
        id: Uuid,
        fields: FieldSet,
    ) -> Result<(), MutationError> {
        self.write()?.pending.release(id, fields);
        trace_phase(op, kind, id, MutationPhase::Committed);
        Ok(())
    }

    fn roll_back(
        &self,
        op: FeedOp,
        kind: EntityKind,
        id: Uuid,
        fields: FieldSet,
        plan: RollbackPlan,
    ) -> Result<(), MutationError> {
        let changes = {
            let mut guard = self.write()?;
            let state = &mut *guard;
            state.pending.release(id, fields);
            plan.execute(&mut state.store, &mut state.projections)
        };
        self.publish_all(changes);
        trace_phase(op, kind, id, MutationPhase::RolledBack);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
