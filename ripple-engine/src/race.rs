//! Race guard
//!
//! A write aimed at an entity whose own create is still in flight must not
//! reach the network: the server has never heard of the ID, so the call
//! could only fail or, worse, interleave with the create. The coordinator
//! detects the speculative target and routes here instead; everything in
//! this module is local-only, needs no pending-write registration, and
//! cannot fail past a missing target.
//!
//! Deleting a speculative entity also defuses its create: the removal bumps
//! the entity's revision, so when the create's server echo finally arrives,
//! the commit-side revision check drops it and the deleted record cannot
//! resurrect.

use crate::changes::StoreChange;
use crate::counters;
use crate::engine::SessionState;
use crate::ordering::resort_projection;
use crate::projection::ProjectionKey;
use ripple_core::{
    Comment, CommentId, CommentPatch, CounterDelta, CounterField, EntityKind, Report, ReportId,
    ReportPatch,
};
use tracing::debug;

pub(crate) fn update_report_locally(
    state: &mut SessionState,
    id: ReportId,
    patch: &ReportPatch,
) -> Option<(Report, Vec<StoreChange>)> {
    state.store.patch_report(&id, patch)?;
    let key = ProjectionKey::ReportFeed;
    state.loads.invalidate(&key);
    resort_projection(&mut state.projections, &key, &state.store);
    let report = state.store.report(&id)?.clone();
    debug!(kind = %EntityKind::Report, id = %id, "race-skipped local update");
    Some((
        report,
        vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())],
    ))
}

pub(crate) fn update_comment_locally(
    state: &mut SessionState,
    id: CommentId,
    patch: &CommentPatch,
) -> Option<(Comment, Vec<StoreChange>)> {
    let report_id = state.store.comment(&id)?.report_id;
    state.store.patch_comment(&id, patch)?;
    let key = ProjectionKey::CommentsFor(report_id);
    state.loads.invalidate(&key);
    resort_projection(&mut state.projections, &key, &state.store);
    let comment = state.store.comment(&id)?.clone();
    debug!(kind = %EntityKind::Comment, id = %id, "race-skipped local update");
    Some((
        comment,
        vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())],
    ))
}

pub(crate) fn toggle_report_locally(
    state: &mut SessionState,
    id: ReportId,
    flip: impl FnOnce(&mut Report),
    delta: Option<CounterDelta>,
) -> Option<(Report, Vec<StoreChange>)> {
    state.store.with_report_mut(&id, flip)?;
    if let Some(delta) = delta {
        if let Err(err) = counters::apply(&mut state.store, &delta) {
            debug!(delta = %delta, %err, "race-skip counter skipped");
        }
    }
    let key = ProjectionKey::ReportFeed;
    state.loads.invalidate(&key);
    resort_projection(&mut state.projections, &key, &state.store);
    let report = state.store.report(&id)?.clone();
    debug!(kind = %EntityKind::Report, id = %id, "race-skipped local toggle");
    Some((
        report,
        vec![StoreChange::upserted(EntityKind::Report, id.as_uuid())],
    ))
}

pub(crate) fn toggle_comment_locally(
    state: &mut SessionState,
    id: CommentId,
    flip: impl FnOnce(&mut Comment),
    delta: Option<CounterDelta>,
) -> Option<(Comment, Vec<StoreChange>)> {
    let report_id = state.store.comment(&id)?.report_id;
    state.store.with_comment_mut(&id, flip)?;
    if let Some(delta) = delta {
        if let Err(err) = counters::apply(&mut state.store, &delta) {
            debug!(delta = %delta, %err, "race-skip counter skipped");
        }
    }
    let key = ProjectionKey::CommentsFor(report_id);
    state.loads.invalidate(&key);
    resort_projection(&mut state.projections, &key, &state.store);
    let comment = state.store.comment(&id)?.clone();
    debug!(kind = %EntityKind::Comment, id = %id, "race-skipped local toggle");
    Some((
        comment,
        vec![StoreChange::upserted(EntityKind::Comment, id.as_uuid())],
    ))
}

pub(crate) fn delete_report_locally(state: &mut SessionState, id: ReportId) -> Vec<StoreChange> {
    if state.store.remove_report(&id).is_none() {
        return Vec::new();
    }
    let purged = state.projections.purge(id.as_uuid());
    for key in &purged {
        state.loads.invalidate(key);
    }
    debug!(kind = %EntityKind::Report, id = %id, "race-skipped local delete");
    vec![StoreChange::removed(EntityKind::Report, id.as_uuid())]
}

pub(crate) fn delete_comment_locally(state: &mut SessionState, id: CommentId) -> Vec<StoreChange> {
    let Some(prior) = state.store.remove_comment(&id) else {
        return Vec::new();
    };
    let purged = state.projections.purge(id.as_uuid());
    for key in &purged {
        state.loads.invalidate(key);
    }
    let mut changes = vec![StoreChange::removed(EntityKind::Comment, id.as_uuid())];
    let delta = CounterDelta::new(
        EntityKind::Report,
        prior.report_id.as_uuid(),
        CounterField::Comments,
        -1,
    );
    match counters::apply(&mut state.store, &delta) {
        Ok(_) => changes.push(StoreChange::upserted(
            EntityKind::Report,
            prior.report_id.as_uuid(),
        )),
        Err(err) => debug!(delta = %delta, %err, "parent counter skipped"),
    }
    debug!(kind = %EntityKind::Comment, id = %id, "race-skipped local delete");
    changes
}

// =============================================================================
// TESTS
// =============================================================================
