//! Property-Based Tests for the Mutation Lifecycle
//!
//! **Property 1: Failed mutations leave no trace**
//! A mutation the transport refuses rolls back to the exact pre-mutation
//! view: same records, same counters, same list order, no pending writes.
//!
//! **Property 2: Creates never materialize unloaded lists**
//! Cached records and rendered lists are separate concerns; a create lands
//! in the store but a list that was never fetched stays "never loaded".
//!
//! **Property 3: Counter conservation**
//! N comment creates and M deletes leave the parent's `comments_count` at
//! N minus M, locally and on the server.
//!
//! **Property 4: Realtime merge idempotence**
//! Applying the same server event twice leaves state identical to once.
//!
//! **Property 5: Race-skipped writes stay off the wire**
//! A mutation whose target's own create is still in flight settles locally
//! and performs zero transport calls.
//!
//! **Property 6: Thread ordering bands**
//! Pinned comments sort before unpinned ones; inside the pinned band the
//! most recent pin-or-update wins, inside the unpinned band creation time.

use chrono::{Duration as ChronoDuration, Utc};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use ripple_core::{
    ActorId, Comment, CommentDraft, CommentPatch, EntityKind, FeedOp, LocalIdentity,
    RealtimeEvent, Report, ReportCategory, ReportDraft, ReportPatch, TransportError,
};
use ripple_engine::{MemoryTransport, MergeOutcome, SessionEngine, StaticIdentity};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

fn writable_engine() -> (Arc<SessionEngine>, Arc<MemoryTransport>) {
    let identity = LocalIdentity::new(ActorId::generate(), "ada");
    let transport = Arc::new(MemoryTransport::new());
    let engine = Arc::new(SessionEngine::new(
        transport.clone(),
        Arc::new(StaticIdentity::ready(identity)),
    ));
    (engine, transport)
}

/// Spin until the transport has seen `count` calls of `op`. The engine makes
/// transport calls outside its lock, so this is the portable way to wait for
/// a parked call to reach the wire.
async fn wait_for_calls(transport: &MemoryTransport, op: FeedOp, count: usize) {
    for _ in 0..500 {
        if transport.calls_of(op) >= count {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("transport never saw {count} calls of {op}");
}

fn title_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{3,40}".prop_map(|s| s.trim().to_string())
}

fn body_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,]{5,120}".prop_map(|s| s.trim().to_string())
}

fn category_strategy() -> impl Strategy<Value = ReportCategory> {
    prop_oneof![
        Just(ReportCategory::Infrastructure),
        Just(ReportCategory::Safety),
        Just(ReportCategory::Environment),
        Just(ReportCategory::Noise),
        Just(ReportCategory::Other),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// **Property 1: Failed mutations leave no trace**
    ///
    /// For any seeded report-plus-comment and any mutation kind, a scripted
    /// transport failure SHALL restore the exact prior view.
    #[test]
    fn prop_failed_mutation_leaves_no_trace(
        title in title_strategy(),
        body in body_strategy(),
        category in category_strategy(),
        op_index in 0usize..10,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, transport) = writable_engine();
            engine.refresh_feed().await.unwrap();

            let report = engine
                .create_report(ReportDraft {
                    title: title.clone(),
                    body: body.clone(),
                    category,
                })
                .await
                .unwrap();
            let report_id = report.report_id;
            engine.refresh_comments(report_id).await.unwrap();
            let comment = engine
                .create_comment(CommentDraft {
                    report_id,
                    parent_id: None,
                    body: body.clone(),
                })
                .await
                .unwrap();
            let comment_id = comment.comment_id;

            let before = (
                engine.feed().unwrap(),
                engine.comments(&report_id).unwrap(),
                engine.counts().unwrap(),
            );

            let op = match op_index {
                0 => FeedOp::UpdateReport,
                1 => FeedOp::DeleteReport,
                2 => FeedOp::SetReportUpvote,
                3 => FeedOp::SetReportFlag,
                4 => FeedOp::CreateReport,
                5 => FeedOp::UpdateComment,
                6 => FeedOp::DeleteComment,
                7 => FeedOp::SetCommentLike,
                8 => FeedOp::SetCommentPin,
                _ => FeedOp::CreateComment,
            };
            transport.fail_next(
                op,
                TransportError::Network {
                    op,
                    message: "scripted".to_string(),
                },
            );

            let result = match op_index {
                0 => engine
                    .update_report(
                        report_id,
                        ReportPatch {
                            title: Some(format!("{title} again")),
                            ..Default::default()
                        },
                    )
                    .await
                    .map(|_| ()),
                1 => engine.delete_report(report_id).await.map(|_| ()),
                2 => engine.toggle_report_upvote(report_id).await.map(|_| ()),
                3 => engine.toggle_report_flag(report_id).await.map(|_| ()),
                4 => engine
                    .create_report(ReportDraft {
                        title: format!("{title} two"),
                        body: body.clone(),
                        category,
                    })
                    .await
                    .map(|_| ()),
                5 => engine
                    .update_comment(
                        comment_id,
                        CommentPatch {
                            body: Some(format!("{body} again")),
                            ..Default::default()
                        },
                    )
                    .await
                    .map(|_| ()),
                6 => engine.delete_comment(comment_id).await.map(|_| ()),
                7 => engine.toggle_comment_like(comment_id).await.map(|_| ()),
                8 => engine.toggle_comment_pin(comment_id).await.map(|_| ()),
                _ => engine
                    .create_comment(CommentDraft {
                        report_id,
                        parent_id: None,
                        body: format!("{body} two"),
                    })
                    .await
                    .map(|_| ()),
            };
            prop_assert!(result.is_err());

            let after = (
                engine.feed().unwrap(),
                engine.comments(&report_id).unwrap(),
                engine.counts().unwrap(),
            );
            prop_assert_eq!(before, after);
            prop_assert_eq!(engine.counts().unwrap().pending_writes, 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 2: Creates never materialize unloaded lists**
    #[test]
    fn prop_creates_never_materialize_unloaded_lists(
        title in title_strategy(),
        body in body_strategy(),
        category in category_strategy(),
        extra in 0usize..3,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _) = writable_engine();

            let first = engine
                .create_report(ReportDraft {
                    title: title.clone(),
                    body: body.clone(),
                    category,
                })
                .await
                .unwrap();
            for i in 0..extra {
                engine
                    .create_report(ReportDraft {
                        title: format!("{title} {i}"),
                        body: body.clone(),
                        category,
                    })
                    .await
                    .unwrap();
            }
            engine
                .create_comment(CommentDraft {
                    report_id: first.report_id,
                    parent_id: None,
                    body: body.clone(),
                })
                .await
                .unwrap();

            // records are cached...
            prop_assert_eq!(engine.counts().unwrap().reports, 1 + extra);
            prop_assert!(engine.report(&first.report_id).unwrap().is_some());
            // ...but lists that were never fetched stay "never loaded"
            prop_assert_eq!(engine.feed().unwrap(), None);
            prop_assert_eq!(engine.comments(&first.report_id).unwrap(), None);

            // the first fetch surfaces everything the server accepted
            engine.refresh_feed().await.unwrap();
            prop_assert_eq!(engine.feed().unwrap().unwrap().len(), 1 + extra);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 3: Counter conservation**
    #[test]
    fn prop_comment_counter_conservation(
        body in body_strategy(),
        n in 1usize..4,
        m in 0usize..4,
    ) {
        prop_assume!(m <= n);
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, transport) = writable_engine();
            let report = engine
                .create_report(ReportDraft {
                    title: "Counter carrier".to_string(),
                    body: body.clone(),
                    category: ReportCategory::Other,
                })
                .await
                .unwrap();
            let report_id = report.report_id;
            engine.refresh_comments(report_id).await.unwrap();

            let mut ids = Vec::new();
            for i in 0..n {
                let comment = engine
                    .create_comment(CommentDraft {
                        report_id,
                        parent_id: None,
                        body: format!("{body} {i}"),
                    })
                    .await
                    .unwrap();
                ids.push(comment.comment_id);
            }
            for id in ids.iter().take(m) {
                engine.delete_comment(*id).await.unwrap();
            }

            let expected = (n - m) as i32;
            prop_assert_eq!(
                engine.report(&report_id).unwrap().unwrap().comments_count,
                expected
            );
            prop_assert_eq!(
                transport.report_row(&report_id).unwrap().comments_count,
                expected
            );
            prop_assert_eq!(
                engine.comments(&report_id).unwrap().unwrap().len(),
                n - m
            );
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 4: Realtime merge idempotence**
    #[test]
    fn prop_realtime_merge_idempotent(
        title in title_strategy(),
        body in body_strategy(),
        category in category_strategy(),
        upvotes in 0..100i32,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, _) = writable_engine();
            engine.refresh_feed().await.unwrap();

            let author = LocalIdentity::new(ActorId::generate(), "remote");
            let mut report = Report::speculative(
                ReportDraft { title, body, category },
                &author,
            )
            .confirmed();
            report.upvotes_count = upvotes;
            let event = RealtimeEvent::created(
                EntityKind::Report,
                report.report_id.as_uuid(),
                serde_json::to_value(&report).unwrap(),
            );

            let first = engine.apply_realtime(event.clone()).unwrap();
            prop_assert_eq!(first, MergeOutcome::Inserted);
            let once = engine.feed().unwrap();

            let second = engine.apply_realtime(event).unwrap();
            prop_assert_eq!(second, MergeOutcome::Updated);
            prop_assert_eq!(engine.feed().unwrap(), once);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 5: Race-skipped writes stay off the wire**
    #[test]
    fn prop_race_skip_never_touches_network(
        body in body_strategy(),
        flip in 0usize..4,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, transport) = writable_engine();
            let report = engine
                .create_report(ReportDraft {
                    title: "Race target".to_string(),
                    body: body.clone(),
                    category: ReportCategory::Other,
                })
                .await
                .unwrap();
            let report_id = report.report_id;
            engine.refresh_comments(report_id).await.unwrap();

            let gate = transport.hold(FeedOp::CreateComment);
            let create = {
                let engine = engine.clone();
                let body = body.clone();
                tokio::spawn(async move {
                    engine
                        .create_comment(CommentDraft {
                            report_id,
                            parent_id: None,
                            body,
                        })
                        .await
                })
            };
            wait_for_calls(&transport, FeedOp::CreateComment, 1).await;

            let thread = engine.comments(&report_id).unwrap().unwrap();
            let target = thread.iter().find(|c| c.speculative).unwrap().comment_id;

            let (skipped_op, race_skipped) = match flip {
                0 => (
                    FeedOp::UpdateComment,
                    engine
                        .update_comment(
                            target,
                            CommentPatch {
                                body: Some("edited".to_string()),
                                ..Default::default()
                            },
                        )
                        .await
                        .unwrap()
                        .is_race_skipped(),
                ),
                1 => (
                    FeedOp::SetCommentLike,
                    engine
                        .toggle_comment_like(target)
                        .await
                        .unwrap()
                        .is_race_skipped(),
                ),
                2 => (
                    FeedOp::SetCommentPin,
                    engine
                        .toggle_comment_pin(target)
                        .await
                        .unwrap()
                        .is_race_skipped(),
                ),
                _ => (
                    FeedOp::DeleteComment,
                    engine
                        .delete_comment(target)
                        .await
                        .unwrap()
                        .is_race_skipped(),
                ),
            };
            prop_assert!(race_skipped);
            prop_assert_eq!(transport.calls_of(skipped_op), 0);

            gate.release();
            create.await.unwrap().unwrap();
            prop_assert_eq!(engine.counts().unwrap().pending_writes, 0);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 6: Thread ordering bands**
    #[test]
    fn prop_pinned_band_sorts_before_unpinned(
        specs in prop::collection::vec(
            (0i64..10_000, prop::option::of(0i64..10_000)),
            1..6,
        ),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (engine, transport) = writable_engine();
            let author = LocalIdentity::new(ActorId::generate(), "remote");
            let report = Report::speculative(
                ReportDraft {
                    title: "Ordering".to_string(),
                    body: "x".to_string(),
                    category: ReportCategory::Other,
                },
                &author,
            )
            .confirmed();
            let report_id = report.report_id;
            transport.seed_reports(vec![report]);

            let base = Utc::now() - ChronoDuration::days(1);
            let rows: Vec<Comment> = specs
                .iter()
                .map(|(created_s, pinned_s)| {
                    let mut comment = Comment::speculative(
                        CommentDraft {
                            report_id,
                            parent_id: None,
                            body: "row".to_string(),
                        },
                        &author,
                        false,
                    );
                    comment.created_at = base + ChronoDuration::seconds(*created_s);
                    comment.updated_at = comment.created_at;
                    comment.pinned = pinned_s.is_some();
                    comment.pinned_at = pinned_s.map(|s| base + ChronoDuration::seconds(s));
                    comment
                })
                .collect();
            transport.seed_comments(rows);

            engine.refresh_comments(report_id).await.unwrap();
            let thread = engine.comments(&report_id).unwrap().unwrap();
            prop_assert_eq!(thread.len(), specs.len());

            // pinned band strictly precedes the unpinned band
            let first_unpinned = thread.iter().position(|c| !c.pinned);
            if let Some(split) = first_unpinned {
                prop_assert!(thread[split..].iter().all(|c| !c.pinned));
            }
            // inside each band the ordering keys are non-increasing
            for window in thread.windows(2) {
                match (window[0].pinned, window[1].pinned) {
                    (true, true) => {
                        prop_assert!(window[0].pin_rank() >= window[1].pin_rank())
                    }
                    (false, false) => {
                        prop_assert!(window[0].created_at >= window[1].created_at)
                    }
                    (true, false) => {}
                    (false, true) => prop_assert!(false, "unpinned sorted above pinned"),
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// An identity that cannot write blocks every mutation before any state
    /// or network effect.
    #[test]
    fn prop_unresolved_identity_blocks_writes(
        title in title_strategy(),
        body in body_strategy(),
        category in category_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let transport = Arc::new(MemoryTransport::new());
            let engine = SessionEngine::new(
                transport.clone(),
                Arc::new(StaticIdentity::not_ready()),
            );

            let err = engine
                .create_report(ReportDraft { title, body, category })
                .await
                .unwrap_err();
            prop_assert!(err.is_identity_not_ready());
            prop_assert_eq!(engine.counts().unwrap().reports, 0);
            prop_assert!(transport.calls().is_empty());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
