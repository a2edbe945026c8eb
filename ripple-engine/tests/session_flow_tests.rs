//! End-to-End Session Scenarios
//!
//! Each test drives a full user-visible flow through the public engine
//! surface: optimistic apply, a scripted transport (held, failed, or both),
//! realtime pushes arriving mid-flight, and the final converged view. The
//! in-memory transport's `hold` lever parks a call at the wire so the test
//! can observe and perturb the optimistic window deterministically.

use ripple_core::{
    ActorId, CommentDraft, CommentId, CommentPatch, EntityKind, FeedOp, LocalIdentity,
    RealtimeEvent, Report, ReportCategory, ReportDraft, ReportId, ReportPatch, TransportError,
};
use ripple_engine::{
    ChangeKind, IgnoreReason, MemoryTransport, MergeOutcome, SessionEngine, StaticIdentity,
    StoreChange,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

fn writable_engine() -> (Arc<SessionEngine>, Arc<MemoryTransport>) {
    let identity = LocalIdentity::new(ActorId::generate(), "ada");
    let transport = Arc::new(MemoryTransport::new());
    let engine = Arc::new(SessionEngine::new(
        transport.clone(),
        Arc::new(StaticIdentity::ready(identity)),
    ));
    (engine, transport)
}

fn draft(title: &str) -> ReportDraft {
    ReportDraft {
        title: title.to_string(),
        body: "Observed near the crossing".to_string(),
        category: ReportCategory::Infrastructure,
    }
}

fn comment_draft(report_id: ReportId, body: &str) -> CommentDraft {
    CommentDraft {
        report_id,
        parent_id: None,
        body: body.to_string(),
    }
}

async fn wait_for_calls(transport: &MemoryTransport, op: FeedOp, count: usize) {
    for _ in 0..500 {
        if transport.calls_of(op) >= count {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("transport never saw {count} calls of {op}");
}

async fn recv_change(rx: &mut broadcast::Receiver<StoreChange>) -> StoreChange {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("timed out waiting for a store change")
        .expect("change bus closed")
}

#[tokio::test]
async fn failed_comment_create_restores_counter_and_thread() {
    let (engine, transport) = writable_engine();

    // ------ seed a confirmed report that already has four comments
    let author = LocalIdentity::new(ActorId::generate(), "sam");
    let mut seeded = Report::speculative(draft("Streetlight out"), &author).confirmed();
    seeded.comments_count = 4;
    let report_id = seeded.report_id;
    transport.seed_reports(vec![seeded]);
    engine.refresh_feed().await.unwrap();
    engine.refresh_comments(report_id).await.unwrap();
    assert_eq!(
        engine.report(&report_id).unwrap().unwrap().comments_count,
        4
    );

    // ------ park the create at the wire and observe the optimistic window
    let gate = transport.hold(FeedOp::CreateComment);
    let create = {
        let engine = engine.clone();
        tokio::spawn(
            async move { engine.create_comment(comment_draft(report_id, "Me too")).await },
        )
    };
    wait_for_calls(&transport, FeedOp::CreateComment, 1).await;

    assert_eq!(
        engine.report(&report_id).unwrap().unwrap().comments_count,
        5
    );
    let thread = engine.comments(&report_id).unwrap().unwrap();
    assert_eq!(thread.len(), 1);
    assert!(thread[0].speculative);

    // ------ script a rejection for the parked call, then let it through
    transport.fail_next(
        FeedOp::CreateComment,
        TransportError::Rejected {
            op: FeedOp::CreateComment,
            code: "validation_failed".to_string(),
            message: "body rejected".to_string(),
        },
    );
    gate.release();
    let err = create.await.unwrap().unwrap_err();
    assert!(err.is_conflict());

    // ------ the rollback restored the exact prior view
    assert_eq!(
        engine.report(&report_id).unwrap().unwrap().comments_count,
        4
    );
    assert!(engine.comments(&report_id).unwrap().unwrap().is_empty());
    assert_eq!(engine.counts().unwrap().pending_writes, 0);
}

#[tokio::test]
async fn realtime_update_overtakes_stale_toggle_echo() {
    let (engine, transport) = writable_engine();
    let report = engine.create_report(draft("Pothole")).await.unwrap();
    engine.refresh_comments(report.report_id).await.unwrap();
    let comment = engine
        .create_comment(comment_draft(report.report_id, "Seen it"))
        .await
        .unwrap();
    let comment_id = comment.comment_id;

    // ------ park the like toggle mid-flight
    let gate = transport.hold(FeedOp::SetCommentLike);
    let toggle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.toggle_comment_like(comment_id).await })
    };
    wait_for_calls(&transport, FeedOp::SetCommentLike, 1).await;

    let optimistic = engine.comment(&comment_id).unwrap().unwrap();
    assert!(optimistic.liked);
    assert_eq!(optimistic.like_count, 1);

    // ------ an authoritative push lands while the call is in flight
    let mut authoritative = optimistic.clone();
    authoritative.liked = true;
    authoritative.like_count = 5;
    authoritative.speculative = false;
    let event = RealtimeEvent::updated(
        EntityKind::Comment,
        comment_id.as_uuid(),
        serde_json::to_value(&authoritative).unwrap(),
    );
    assert_eq!(engine.apply_realtime(event).unwrap(), MergeOutcome::Updated);

    // ------ the released echo is older than the push and must not win
    gate.release();
    let outcome = toggle.await.unwrap().unwrap();
    assert!(!outcome.is_race_skipped());

    let settled = engine.comment(&comment_id).unwrap().unwrap();
    assert!(settled.liked);
    assert_eq!(settled.like_count, 5);
    assert_eq!(engine.counts().unwrap().pending_writes, 0);
}

#[tokio::test]
async fn mutation_cancels_in_flight_feed_load() {
    let (engine, transport) = writable_engine();

    // ------ a feed fetch is parked at the wire
    let gate = transport.hold(FeedOp::FetchFeed);
    let refresh = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.refresh_feed().await })
    };
    wait_for_calls(&transport, FeedOp::FetchFeed, 1).await;

    // ------ the user acts while the fetch is in flight
    let report = engine.create_report(draft("Fallen branch")).await.unwrap();

    // ------ the stale fetch result is discarded whole
    gate.release();
    let applied = refresh.await.unwrap().unwrap();
    assert!(!applied);
    assert_eq!(engine.feed().unwrap(), None);

    // ------ a fresh fetch lands and carries the report exactly once
    assert!(engine.refresh_feed().await.unwrap());
    let feed = engine.feed().unwrap().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].report_id, report.report_id);
}

#[tokio::test]
async fn realtime_delete_wins_over_in_flight_update() {
    let (engine, transport) = writable_engine();
    engine.refresh_feed().await.unwrap();
    let report = engine.create_report(draft("Blocked drain")).await.unwrap();
    let report_id = report.report_id;

    // ------ park an update, then a moderator deletes the report server-side
    let gate = transport.hold(FeedOp::UpdateReport);
    let update = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_report(
                    report_id,
                    ReportPatch {
                        title: Some("Blocked drain, update".to_string()),
                        ..Default::default()
                    },
                )
                .await
        })
    };
    wait_for_calls(&transport, FeedOp::UpdateReport, 1).await;

    let event = RealtimeEvent::deleted(EntityKind::Report, report_id.as_uuid());
    assert_eq!(engine.apply_realtime(event).unwrap(), MergeOutcome::Removed);
    assert_eq!(engine.report(&report_id).unwrap(), None);

    // ------ the stale update echo must not resurrect the record
    gate.release();
    update.await.unwrap().unwrap();
    assert_eq!(engine.report(&report_id).unwrap(), None);
    assert!(engine.feed().unwrap().unwrap().is_empty());

    // ------ neither may a late created push for the same ID
    let moderator = LocalIdentity::new(ActorId::generate(), "sam");
    let mut ghost = Report::speculative(draft("Blocked drain"), &moderator).confirmed();
    ghost.report_id = report_id;
    let late = RealtimeEvent::created(
        EntityKind::Report,
        report_id.as_uuid(),
        serde_json::to_value(&ghost).unwrap(),
    );
    assert_eq!(
        engine.apply_realtime(late).unwrap(),
        MergeOutcome::Ignored(IgnoreReason::Stale)
    );
    assert_eq!(engine.report(&report_id).unwrap(), None);
}

#[tokio::test]
async fn race_skipped_delete_defuses_create_echo() {
    let (engine, transport) = writable_engine();
    let report = engine.create_report(draft("Loud party")).await.unwrap();
    engine.refresh_comments(report.report_id).await.unwrap();

    // ------ the comment's own create is parked at the wire
    let gate = transport.hold(FeedOp::CreateComment);
    let create = {
        let engine = engine.clone();
        let report_id = report.report_id;
        tokio::spawn(async move {
            engine
                .create_comment(comment_draft(report_id, "Typo, deleting"))
                .await
        })
    };
    wait_for_calls(&transport, FeedOp::CreateComment, 1).await;

    let thread = engine.comments(&report.report_id).unwrap().unwrap();
    let target = thread.iter().find(|c| c.speculative).unwrap().comment_id;

    // ------ deleting the speculative comment settles locally, off the wire
    let outcome = engine.delete_comment(target).await.unwrap();
    assert!(outcome.is_race_skipped());
    assert_eq!(transport.calls_of(FeedOp::DeleteComment), 0);
    assert_eq!(engine.comment(&target).unwrap(), None);

    // ------ the create echo arrives late and must not re-add the comment
    gate.release();
    create.await.unwrap().unwrap();
    assert_eq!(engine.comment(&target).unwrap(), None);
    assert!(engine.comments(&report.report_id).unwrap().unwrap().is_empty());
    assert_eq!(engine.counts().unwrap().pending_writes, 0);
}

#[tokio::test]
async fn unresolved_identity_blocks_every_mutation() {
    let transport = Arc::new(MemoryTransport::new());
    let engine = SessionEngine::new(
        transport.clone(),
        Arc::new(StaticIdentity::not_ready()),
    );
    let report_id = ReportId::generate();
    let comment_id = CommentId::generate();
    let patch = ReportPatch {
        title: Some("x".to_string()),
        ..Default::default()
    };
    let comment_patch = CommentPatch {
        body: Some("x".to_string()),
        ..Default::default()
    };

    assert!(engine
        .create_report(draft("Nope"))
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .update_report(report_id, patch)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .delete_report(report_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .toggle_report_upvote(report_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .toggle_report_flag(report_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .create_comment(comment_draft(report_id, "Nope"))
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .update_comment(comment_id, comment_patch)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .delete_comment(comment_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .toggle_comment_like(comment_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());
    assert!(engine
        .toggle_comment_pin(comment_id)
        .await
        .unwrap_err()
        .is_identity_not_ready());

    // nothing was cached, nothing reached the wire
    assert_eq!(engine.counts().unwrap().reports, 0);
    assert_eq!(engine.counts().unwrap().comments, 0);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn subscribers_see_apply_and_confirm_for_a_create() {
    let (engine, _) = writable_engine();
    engine.refresh_feed().await.unwrap();

    let mut rx = engine.subscribe();
    let report = engine.create_report(draft("New bench")).await.unwrap();

    // optimistic apply, then server confirmation, for the same record
    let first = recv_change(&mut rx).await;
    assert_eq!(first.kind, EntityKind::Report);
    assert_eq!(first.id, report.report_id.as_uuid());
    assert_eq!(first.change, ChangeKind::Upserted);

    let second = recv_change(&mut rx).await;
    assert_eq!(second.kind, EntityKind::Report);
    assert_eq!(second.id, report.report_id.as_uuid());
    assert_eq!(second.change, ChangeKind::Upserted);
}
