//! Realtime reconciler
//!
//! Folds the server's broadcast stream into local state. The stream is
//! trusted and ordered: `created`/`updated` carry the full authoritative
//! record and replace whatever is cached (the server's denormalized
//! counters simply land with the upsert; no local deltas are applied),
//! `deleted` removes the record and purges it from every projection.
//!
//! The reconciler also receives echoes of this session's own writes. That
//! is by construction idempotent: the authoritative record upserts over the
//! optimistic one and clears `speculative`, and the revision bump it causes
//! is what makes the later commit-side echo drop itself.

use crate::changes::StoreChange;
use crate::engine::SessionEngine;
use crate::ordering::resort_projection;
use crate::projection::ProjectionKey;
use ripple_core::{
    Badge, Comment, EntityKind, RealtimeAction, RealtimeEvent, Report, SyncResult, TransportError,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What a merge did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Removed,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A `deleted` for an ID the store never held.
    UnknownEntity,
    /// A `created`/`updated` frame without its record.
    MissingPayload,
    /// The entity was removed locally; applying the event would resurrect it.
    Stale,
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: EntityKind,
    id: Uuid,
    payload: Value,
) -> Result<T, TransportError> {
    serde_json::from_value(payload).map_err(|err| TransportError::Decode {
        message: format!("{kind} {id}: {err}"),
    })
}

impl SessionEngine {
    /// Merge one realtime event. Idempotent: the same event twice leaves
    /// state identical to once.
    pub fn apply_realtime(&self, event: RealtimeEvent) -> SyncResult<MergeOutcome> {
        let kind = event.entity_type;
        let id = event.entity_id;

        let (outcome, changes) = match event.action {
            RealtimeAction::Created | RealtimeAction::Updated => {
                let Some(payload) = event.payload else {
                    warn!(kind = %kind, %id, action = %event.action, "realtime frame without payload");
                    return Ok(MergeOutcome::Ignored(IgnoreReason::MissingPayload));
                };
                match kind {
                    EntityKind::Report => {
                        let report: Report = decode(kind, id, payload)?;
                        if report.report_id.as_uuid() != id {
                            return Err(TransportError::Decode {
                                message: format!(
                                    "payload ID {} does not match event ID {id}",
                                    report.report_id
                                ),
                            }
                            .into());
                        }
                        self.merge_report(report)?
                    }
                    EntityKind::Comment => {
                        let comment: Comment = decode(kind, id, payload)?;
                        if comment.comment_id.as_uuid() != id {
                            return Err(TransportError::Decode {
                                message: format!(
                                    "payload ID {} does not match event ID {id}",
                                    comment.comment_id
                                ),
                            }
                            .into());
                        }
                        self.merge_comment(comment)?
                    }
                    EntityKind::Badge => {
                        let badge: Badge = decode(kind, id, payload)?;
                        if badge.badge_id.as_uuid() != id {
                            return Err(TransportError::Decode {
                                message: format!(
                                    "payload ID {} does not match event ID {id}",
                                    badge.badge_id
                                ),
                            }
                            .into());
                        }
                        self.merge_badge(badge)?
                    }
                }
            }
            RealtimeAction::Deleted => self.merge_removal(kind, id)?,
        };

        self.publish_all(changes);
        debug!(kind = %kind, %id, outcome = ?outcome, "realtime merge");
        Ok(outcome)
    }

    fn merge_report(&self, report: Report) -> SyncResult<(MergeOutcome, Vec<StoreChange>)> {
        let id = report.report_id.as_uuid();
        let mut guard = self.write()?;
        let state = &mut *guard;
        if state.store.removed(EntityKind::Report, id) {
            return Ok((MergeOutcome::Ignored(IgnoreReason::Stale), Vec::new()));
        }
        let known = state.store.contains(EntityKind::Report, id);
        state.store.upsert_report(report.confirmed());
        let key = ProjectionKey::ReportFeed;
        state.projections.insert(key, id);
        resort_projection(&mut state.projections, &key, &state.store);
        let outcome = if known {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Inserted
        };
        Ok((
            outcome,
            vec![StoreChange::upserted(EntityKind::Report, id)],
        ))
    }

    fn merge_comment(&self, comment: Comment) -> SyncResult<(MergeOutcome, Vec<StoreChange>)> {
        let id = comment.comment_id.as_uuid();
        let key = ProjectionKey::CommentsFor(comment.report_id);
        let mut guard = self.write()?;
        let state = &mut *guard;
        if state.store.removed(EntityKind::Comment, id) {
            return Ok((MergeOutcome::Ignored(IgnoreReason::Stale), Vec::new()));
        }
        let known = state.store.contains(EntityKind::Comment, id);
        state.store.upsert_comment(comment.confirmed());
        state.projections.insert(key, id);
        resort_projection(&mut state.projections, &key, &state.store);
        let outcome = if known {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Inserted
        };
        Ok((
            outcome,
            vec![StoreChange::upserted(EntityKind::Comment, id)],
        ))
    }

    fn merge_badge(&self, badge: Badge) -> SyncResult<(MergeOutcome, Vec<StoreChange>)> {
        let id = badge.badge_id.as_uuid();
        let key = ProjectionKey::BadgesFor(badge.actor_id);
        let mut guard = self.write()?;
        let state = &mut *guard;
        if state.store.removed(EntityKind::Badge, id) {
            return Ok((MergeOutcome::Ignored(IgnoreReason::Stale), Vec::new()));
        }
        let known = state.store.contains(EntityKind::Badge, id);
        state.store.upsert_badge(badge.confirmed());
        state.projections.insert(key, id);
        resort_projection(&mut state.projections, &key, &state.store);
        let outcome = if known {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Inserted
        };
        Ok((outcome, vec![StoreChange::upserted(EntityKind::Badge, id)]))
    }

    fn merge_removal(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> SyncResult<(MergeOutcome, Vec<StoreChange>)> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        if !state.store.remove(kind, id) {
            return Ok((
                MergeOutcome::Ignored(IgnoreReason::UnknownEntity),
                Vec::new(),
            ));
        }
        state.projections.purge(id);
        Ok((
            MergeOutcome::Removed,
            vec![StoreChange::removed(kind, id)],
        ))
    }
}

/// Drain a realtime channel into the engine. One bad event is logged and
/// skipped; the stream keeps flowing.
pub async fn run_realtime(engine: Arc<SessionEngine>, mut events: mpsc::Receiver<RealtimeEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(err) = engine.apply_realtime(event) {
            warn!(%err, "realtime merge failed");
        }
    }
    debug!("realtime channel closed");
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::memory::MemoryTransport;
    use ripple_core::{
        ActorId, CommentDraft, LocalIdentity, ReportCategory, ReportDraft, SyncError,
    };

    fn engine() -> SessionEngine {
        SessionEngine::new(
            Arc::new(MemoryTransport::new()),
            Arc::new(StaticIdentity::ready(LocalIdentity::new(
                ActorId::generate(),
                "ada",
            ))),
        )
    }

    fn server_report() -> Report {
        Report::speculative(
            ReportDraft {
                title: "Loose paving".to_string(),
                body: "Near the fountain".to_string(),
                category: ReportCategory::Safety,
            },
            &LocalIdentity::new(ActorId::generate(), "remote"),
        )
        .confirmed()
    }

    fn created_event(report: &Report) -> RealtimeEvent {
        RealtimeEvent::created(
            EntityKind::Report,
            report.report_id.as_uuid(),
            serde_json::to_value(report).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_created_inserts_into_materialized_projection() {
        let engine = engine();
        engine.refresh_feed().await.unwrap();

        let report = server_report();
        let outcome = engine.apply_realtime(created_event(&report)).unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);

        let feed = engine.feed().unwrap().unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].report_id, report.report_id);
        assert!(!feed[0].speculative);
    }

    #[test]
    fn test_created_never_materializes_an_unloaded_projection() {
        let engine = engine();
        let report = server_report();
        let outcome = engine.apply_realtime(created_event(&report)).unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);
        // the record is cached, but the feed still reads "never loaded"
        assert!(engine.report(&report.report_id).unwrap().is_some());
        assert_eq!(engine.feed().unwrap(), None);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let engine = engine();
        engine.refresh_feed().await.unwrap();
        let report = server_report();

        engine.apply_realtime(created_event(&report)).unwrap();
        let before = engine.feed().unwrap().unwrap();
        let second = engine.apply_realtime(created_event(&report)).unwrap();
        assert_eq!(second, MergeOutcome::Updated);
        assert_eq!(engine.feed().unwrap().unwrap(), before);
    }

    #[test]
    fn test_deleted_removes_and_purges() {
        let engine = engine();
        let report = server_report();
        let id = report.report_id;
        engine.apply_realtime(created_event(&report)).unwrap();

        let outcome = engine
            .apply_realtime(RealtimeEvent::deleted(EntityKind::Report, id.as_uuid()))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Removed);
        assert!(engine.report(&id).unwrap().is_none());

        // idempotent: deleting again is a no-op
        let again = engine
            .apply_realtime(RealtimeEvent::deleted(EntityKind::Report, id.as_uuid()))
            .unwrap();
        assert_eq!(
            again,
            MergeOutcome::Ignored(IgnoreReason::UnknownEntity)
        );
    }

    #[test]
    fn test_frame_without_payload_is_ignored() {
        let engine = engine();
        let mut event = created_event(&server_report());
        event.payload = None;
        let outcome = engine.apply_realtime(event).unwrap();
        assert_eq!(outcome, MergeOutcome::Ignored(IgnoreReason::MissingPayload));
    }

    #[test]
    fn test_malformed_payload_is_a_decode_error() {
        let engine = engine();
        let event = RealtimeEvent::created(
            EntityKind::Report,
            Uuid::now_v7(),
            serde_json::json!({ "nonsense": true }),
        );
        let err = engine.apply_realtime(event).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Transport(TransportError::Decode { .. })
        ));
    }

    #[test]
    fn test_mismatched_payload_id_is_refused() {
        let engine = engine();
        let report = server_report();
        let event = RealtimeEvent::created(
            EntityKind::Report,
            Uuid::now_v7(),
            serde_json::to_value(&report).unwrap(),
        );
        assert!(engine.apply_realtime(event).is_err());
    }

    #[test]
    fn test_authoritative_record_replaces_speculative_wholesale() {
        let engine = engine();
        let mut report = server_report();
        let id = report.report_id;
        {
            let mut state = engine.write().unwrap();
            let mut speculative = report.clone();
            speculative.speculative = true;
            speculative.upvotes_count = 0;
            state.store.upsert_report(speculative);
        }

        report.upvotes_count = 7;
        let outcome = engine
            .apply_realtime(RealtimeEvent::updated(
                EntityKind::Report,
                id.as_uuid(),
                serde_json::to_value(&report).unwrap(),
            ))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);

        let merged = engine.report(&id).unwrap().unwrap();
        assert!(!merged.speculative);
        assert_eq!(merged.upvotes_count, 7);
    }

    #[test]
    fn test_event_for_locally_removed_entity_is_stale() {
        let engine = engine();
        let report = server_report();
        let id = report.report_id;
        engine.apply_realtime(created_event(&report)).unwrap();
        {
            let mut state = engine.write().unwrap();
            state.store.remove_report(&id);
        }

        let outcome = engine.apply_realtime(created_event(&report)).unwrap();
        assert_eq!(outcome, MergeOutcome::Ignored(IgnoreReason::Stale));
        assert!(engine.report(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pump_survives_bad_events() {
        let engine = Arc::new(engine());
        engine.refresh_feed().await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(run_realtime(Arc::clone(&engine), rx));

        let bad = RealtimeEvent::created(
            EntityKind::Report,
            Uuid::now_v7(),
            serde_json::json!("garbage"),
        );
        tx.send(bad).await.unwrap();
        let good = server_report();
        tx.send(created_event(&good)).await.unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(engine.feed().unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_comment_created_lands_in_thread() {
        let engine = engine();
        let report = server_report();
        let report_id = report.report_id;
        engine.apply_realtime(created_event(&report)).unwrap();
        engine.refresh_comments(report_id).await.unwrap();

        let comment = Comment::speculative(
            CommentDraft {
                report_id,
                parent_id: None,
                body: "from another session".to_string(),
            },
            &LocalIdentity::new(ActorId::generate(), "remote"),
            false,
        )
        .confirmed();
        let outcome = engine
            .apply_realtime(RealtimeEvent::created(
                EntityKind::Comment,
                comment.comment_id.as_uuid(),
                serde_json::to_value(&comment).unwrap(),
            ))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);
        let thread = engine.comments(&report_id).unwrap().unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].body, "from another session");
    }
}
