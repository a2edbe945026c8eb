//! Counter propagator
//!
//! Applies additive deltas to the denormalized aggregate fields on cached
//! entities: `comments_count`/`upvotes_count` on reports, `like_count` on
//! comments. Deltas are the ONLY way counters move locally; patches carry
//! no counter fields.
//!
//! No clamping, no saturation: `apply(d)` followed by `apply(d.inverted())`
//! must restore the original value bit-for-bit, which is what rollback
//! relies on. Authoritative server payloads overwrite counters wholesale on
//! merge; that path bypasses the propagator entirely.
//!
//! Propagation is internal bookkeeping of the engine, not a user write, so
//! it is not subject to the identity gate.

use crate::store::{EntityStore, Revision};
use ripple_core::{CommentId, CounterDelta, CounterField, EntityKind, MutationError, ReportId};

/// Apply one delta to the store. Fails without touching anything when the
/// field does not belong on the target kind or the target is not cached.
pub fn apply(store: &mut EntityStore, delta: &CounterDelta) -> Result<Revision, MutationError> {
    if delta.field.carrier() != delta.kind {
        return Err(MutationError::CounterMismatch {
            kind: delta.kind,
            field: delta.field,
        });
    }
    let revision = match (delta.kind, delta.field) {
        (EntityKind::Report, CounterField::Comments) => store
            .with_report_mut(&ReportId::new(delta.id), |report| {
                report.comments_count += delta.amount;
            }),
        (EntityKind::Report, CounterField::Upvotes) => store
            .with_report_mut(&ReportId::new(delta.id), |report| {
                report.upvotes_count += delta.amount;
            }),
        (EntityKind::Comment, CounterField::Likes) => store
            .with_comment_mut(&CommentId::new(delta.id), |comment| {
                comment.like_count += delta.amount;
            }),
        // carrier() already ruled these out
        _ => None,
    };
    revision.ok_or(MutationError::MissingTarget {
        kind: delta.kind,
        id: delta.id,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{ActorId, LocalIdentity, Report, ReportCategory, ReportDraft};

    fn seeded_store() -> (EntityStore, ReportId) {
        let identity = LocalIdentity::new(ActorId::generate(), "ada");
        let report = Report::speculative(
            ReportDraft {
                title: "Overflowing bin".to_string(),
                body: "Corner of Elm".to_string(),
                category: ReportCategory::Environment,
            },
            &identity,
        );
        let id = report.report_id;
        let mut store = EntityStore::new();
        store.upsert_report(report.confirmed());
        (store, id)
    }

    #[test]
    fn test_apply_and_inverse_conserve() {
        let (mut store, id) = seeded_store();
        let original = store.report(&id).unwrap().comments_count;

        let delta = CounterDelta::new(
            EntityKind::Report,
            id.as_uuid(),
            CounterField::Comments,
            1,
        );
        apply(&mut store, &delta).unwrap();
        assert_eq!(store.report(&id).unwrap().comments_count, original + 1);

        apply(&mut store, &delta.inverted()).unwrap();
        assert_eq!(store.report(&id).unwrap().comments_count, original);
    }

    #[test]
    fn test_n_applies_m_inversions() {
        let (mut store, id) = seeded_store();
        let original = store.report(&id).unwrap().upvotes_count;
        let delta = CounterDelta::new(EntityKind::Report, id.as_uuid(), CounterField::Upvotes, 1);

        let n = 7;
        let m = 3;
        for _ in 0..n {
            apply(&mut store, &delta).unwrap();
        }
        for _ in 0..m {
            apply(&mut store, &delta.inverted()).unwrap();
        }
        assert_eq!(
            store.report(&id).unwrap().upvotes_count,
            original + n - m
        );
    }

    #[test]
    fn test_mismatched_field_refused() {
        let (mut store, id) = seeded_store();
        let delta = CounterDelta::new(EntityKind::Report, id.as_uuid(), CounterField::Likes, 1);
        let err = apply(&mut store, &delta).unwrap_err();
        assert!(matches!(err, MutationError::CounterMismatch { .. }));
        // nothing moved
        assert_eq!(store.report(&id).unwrap().upvotes_count, 0);
    }

    #[test]
    fn test_missing_target_refused() {
        let (mut store, _) = seeded_store();
        let delta = CounterDelta::new(
            EntityKind::Comment,
            uuid::Uuid::now_v7(),
            CounterField::Likes,
            1,
        );
        let err = apply(&mut store, &delta).unwrap_err();
        assert!(matches!(err, MutationError::MissingTarget { .. }));
    }
}
