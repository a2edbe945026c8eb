//! RIPPLE Test Utilities
//!
//! Centralized test infrastructure for the RIPPLE workspace:
//! - Proptest generators for all entity types
//! - The scriptable in-memory transport plus ready-wired engine harnesses
//! - Test fixtures for common scenarios
//! - Custom assertions for RIPPLE-specific validation

// Re-export the scriptable transport and harness types from their source crate
pub use ripple_engine::{
    HoldHandle, IgnoreReason, MemoryTransport, MergeOutcome, MutationOutcome, SessionEngine,
    StaticIdentity, StoreCounts,
};

// Re-export core types for convenience
pub use ripple_core::{
    ActorId, ActorRole, Author, Badge, BadgeId, BadgeKind, Comment, CommentDraft, CommentId,
    CommentPatch, CounterDelta, CounterField, EntityKind, FeedOp, IdentityError, LocalIdentity,
    MutationError, RealtimeAction, RealtimeEvent, Report, ReportCategory, ReportDraft, ReportId,
    ReportPatch, ReportStatus, SyncError, SyncResult, Timestamp, TransportError,
};

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating RIPPLE entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a valid UUIDv7 (timestamp-sortable).
    pub fn arb_uuid_v7() -> impl Strategy<Value = Uuid> {
        Just(()).prop_map(|_| Uuid::now_v7())
    }

    /// Generate a random ReportId.
    pub fn arb_report_id() -> impl Strategy<Value = ReportId> {
        arb_uuid().prop_map(ReportId::new)
    }

    /// Generate a random CommentId.
    pub fn arb_comment_id() -> impl Strategy<Value = CommentId> {
        arb_uuid().prop_map(CommentId::new)
    }

    /// Generate a random BadgeId.
    pub fn arb_badge_id() -> impl Strategy<Value = BadgeId> {
        arb_uuid().prop_map(BadgeId::new)
    }

    /// Generate a random ActorId.
    pub fn arb_actor_id() -> impl Strategy<Value = ActorId> {
        arb_uuid().prop_map(ActorId::new)
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    // === Enum Generators ===

    /// Generate a ReportCategory variant.
    pub fn arb_report_category() -> impl Strategy<Value = ReportCategory> {
        prop_oneof![
            Just(ReportCategory::Infrastructure),
            Just(ReportCategory::Safety),
            Just(ReportCategory::Environment),
            Just(ReportCategory::Noise),
            Just(ReportCategory::Other),
        ]
    }

    /// Generate a ReportStatus variant.
    pub fn arb_report_status() -> impl Strategy<Value = ReportStatus> {
        prop_oneof![
            Just(ReportStatus::Open),
            Just(ReportStatus::InProgress),
            Just(ReportStatus::Resolved),
        ]
    }

    /// Generate a BadgeKind variant.
    pub fn arb_badge_kind() -> impl Strategy<Value = BadgeKind> {
        prop_oneof![
            Just(BadgeKind::FirstReport),
            Just(BadgeKind::FirstComment),
            Just(BadgeKind::HelpfulNeighbor),
            Just(BadgeKind::ReportResolved),
            Just(BadgeKind::WeekStreak),
        ]
    }

    /// Generate an ActorRole variant.
    pub fn arb_actor_role() -> impl Strategy<Value = ActorRole> {
        prop_oneof![Just(ActorRole::Member), Just(ActorRole::ReadOnly)]
    }

    /// Generate a RealtimeAction variant.
    pub fn arb_realtime_action() -> impl Strategy<Value = RealtimeAction> {
        prop_oneof![
            Just(RealtimeAction::Created),
            Just(RealtimeAction::Updated),
            Just(RealtimeAction::Deleted),
        ]
    }

    /// Generate a CounterField variant.
    pub fn arb_counter_field() -> impl Strategy<Value = CounterField> {
        prop_oneof![
            Just(CounterField::Comments),
            Just(CounterField::Upvotes),
            Just(CounterField::Likes),
        ]
    }

    // === Struct Generators ===

    /// Generate an actor alias.
    pub fn arb_alias() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,15}".prop_map(|s| s)
    }

    /// Generate an embedded Author.
    pub fn arb_author() -> impl Strategy<Value = Author> {
        (
            arb_actor_id(),
            arb_alias(),
            prop::option::of("[a-z]{3,12}".prop_map(|s| format!("https://img.example/{}.png", s))),
            any::<bool>(),
        )
            .prop_map(|(actor_id, alias, avatar_url, is_owner)| Author {
                actor_id,
                alias,
                avatar_url,
                is_owner,
            })
    }

    /// Generate a resolved LocalIdentity.
    pub fn arb_local_identity() -> impl Strategy<Value = LocalIdentity> {
        (arb_actor_id(), arb_alias(), arb_actor_role()).prop_map(|(actor_id, alias, role)| {
            LocalIdentity {
                actor_id,
                alias,
                avatar_url: None,
                role,
            }
        })
    }

    /// Generate a ReportDraft.
    pub fn arb_report_draft() -> impl Strategy<Value = ReportDraft> {
        (
            "[a-zA-Z0-9 ]{3,60}".prop_map(|s| s),
            "[a-zA-Z0-9 .,]{5,200}".prop_map(|s| s),
            arb_report_category(),
        )
            .prop_map(|(title, body, category)| ReportDraft {
                title,
                body,
                category,
            })
    }

    /// Generate a CommentDraft under the given report.
    pub fn arb_comment_draft(report_id: ReportId) -> impl Strategy<Value = CommentDraft> {
        (
            prop::option::of(arb_comment_id()),
            "[a-zA-Z0-9 .,]{1,200}".prop_map(|s| s),
        )
            .prop_map(move |(parent_id, body)| CommentDraft {
                report_id,
                parent_id,
                body,
            })
    }

    /// Generate a server-confirmed Report.
    pub fn arb_report() -> impl Strategy<Value = Report> {
        (
            arb_report_id(),
            arb_author(),
            "[a-zA-Z0-9 ]{3,60}".prop_map(|s| s),
            "[a-zA-Z0-9 .,]{5,200}".prop_map(|s| s),
            arb_report_category(),
            arb_report_status(),
            0i32..500,
            0i32..500,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                |(
                    report_id,
                    author,
                    title,
                    body,
                    category,
                    status,
                    comments_count,
                    upvotes_count,
                    pinned,
                    created_at,
                )| {
                    Report {
                        report_id,
                        author,
                        title,
                        body,
                        category,
                        status,
                        comments_count,
                        upvotes_count,
                        upvoted: false,
                        flagged: false,
                        pinned,
                        speculative: false,
                        created_at,
                        updated_at: created_at,
                        resolved_at: None,
                    }
                },
            )
    }

    /// Generate a server-confirmed Comment under the given report.
    pub fn arb_comment(report_id: ReportId) -> impl Strategy<Value = Comment> {
        (
            arb_comment_id(),
            prop::option::of(arb_comment_id()),
            arb_author(),
            "[a-zA-Z0-9 .,]{1,200}".prop_map(|s| s),
            0i32..200,
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                move |(comment_id, parent_id, author, body, like_count, pinned, created_at)| {
                    Comment {
                        comment_id,
                        report_id,
                        parent_id,
                        author,
                        body,
                        like_count,
                        liked: false,
                        pinned,
                        pinned_at: pinned.then_some(created_at),
                        speculative: false,
                        created_at,
                        updated_at: created_at,
                    }
                },
            )
    }

    /// Generate a Badge awarded to the given actor.
    pub fn arb_badge(actor_id: ActorId) -> impl Strategy<Value = Badge> {
        (
            arb_badge_id(),
            arb_badge_kind(),
            "[a-zA-Z ]{3,30}".prop_map(|s| s),
            1i32..100,
            arb_timestamp(),
        )
            .prop_map(move |(badge_id, kind, label, points, awarded_at)| Badge {
                badge_id,
                actor_id,
                kind,
                label,
                points,
                speculative: false,
                awarded_at,
            })
    }

    /// Generate a ReportPatch touching content fields only.
    pub fn arb_report_patch() -> impl Strategy<Value = ReportPatch> {
        (
            prop::option::of("[a-zA-Z0-9 ]{3,60}".prop_map(|s| s)),
            prop::option::of("[a-zA-Z0-9 .,]{5,200}".prop_map(|s| s)),
            prop::option::of(arb_report_category()),
            prop::option::of(arb_report_status()),
        )
            .prop_map(|(title, body, category, status)| ReportPatch {
                title,
                body,
                category,
                status,
                ..Default::default()
            })
    }

    /// Generate a CommentPatch touching content fields only.
    pub fn arb_comment_patch() -> impl Strategy<Value = CommentPatch> {
        (
            prop::option::of("[a-zA-Z0-9 .,]{1,200}".prop_map(|s| s)),
            prop::option::of(any::<bool>()),
        )
            .prop_map(|(body, pinned)| CommentPatch {
                body,
                pinned,
                ..Default::default()
            })
    }

    /// Generate a CounterDelta whose kind agrees with its field's carrier.
    pub fn arb_counter_delta() -> impl Strategy<Value = CounterDelta> {
        (arb_counter_field(), arb_uuid(), -3i32..=3).prop_map(|(field, id, amount)| {
            CounterDelta::new(field.carrier(), id, field, amount)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A writable member identity.
    pub fn member_identity() -> LocalIdentity {
        LocalIdentity::new(ActorId::generate(), "ada")
    }

    /// An identity that resolves but may never mutate.
    pub fn read_only_identity() -> LocalIdentity {
        LocalIdentity::new(ActorId::generate(), "watcher").with_role(ActorRole::ReadOnly)
    }

    /// A server-confirmed report with the given title.
    pub fn confirmed_report(title: &str) -> Report {
        let draft = ReportDraft {
            title: title.to_string(),
            body: "Spotted this morning near the crosswalk".to_string(),
            category: ReportCategory::Infrastructure,
        };
        Report::speculative(draft, &member_identity()).confirmed()
    }

    /// A server-confirmed top-level comment under the given report.
    pub fn confirmed_comment(report_id: ReportId, body: &str) -> Comment {
        let draft = CommentDraft {
            report_id,
            parent_id: None,
            body: body.to_string(),
        };
        Comment::speculative(draft, &member_identity(), false).confirmed()
    }

    /// A badge as minted by the server-side evaluator.
    pub fn awarded_badge(actor_id: ActorId, kind: BadgeKind) -> Badge {
        let label = match kind {
            BadgeKind::FirstReport => "First Report",
            BadgeKind::FirstComment => "First Comment",
            BadgeKind::HelpfulNeighbor => "Helpful Neighbor",
            BadgeKind::ReportResolved => "Report Resolved",
            BadgeKind::WeekStreak => "Week Streak",
        };
        Badge {
            badge_id: BadgeId::generate(),
            actor_id,
            kind,
            label: label.to_string(),
            points: 10,
            speculative: false,
            awarded_at: Utc::now(),
        }
    }

    /// An engine wired to a fresh in-memory transport with a writable identity.
    pub fn writable_engine() -> (Arc<SessionEngine>, Arc<MemoryTransport>, LocalIdentity) {
        let identity = member_identity();
        let transport = Arc::new(MemoryTransport::new());
        let resolver = Arc::new(StaticIdentity::ready(identity.clone()));
        let engine = Arc::new(SessionEngine::new(transport.clone(), resolver));
        (engine, transport, identity)
    }

    /// An engine whose identity never resolves. Every mutation fails fast.
    pub fn unresolved_engine() -> (Arc<SessionEngine>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let resolver = Arc::new(StaticIdentity::not_ready());
        let engine = Arc::new(SessionEngine::new(transport.clone(), resolver));
        (engine, transport)
    }

    /// An engine resolved to a read-only viewer.
    pub fn read_only_engine() -> (Arc<SessionEngine>, Arc<MemoryTransport>, LocalIdentity) {
        let identity = read_only_identity();
        let transport = Arc::new(MemoryTransport::new());
        let resolver = Arc::new(StaticIdentity::ready(identity.clone()));
        let engine = Arc::new(SessionEngine::new(transport.clone(), resolver));
        (engine, transport, identity)
    }

    /// A realtime `created` frame carrying the given report.
    pub fn report_created_event(report: &Report) -> RealtimeEvent {
        let payload = serde_json::to_value(report).expect("report serializes");
        RealtimeEvent::created(EntityKind::Report, report.report_id.as_uuid(), payload)
    }

    /// A realtime `updated` frame carrying the given report.
    pub fn report_updated_event(report: &Report) -> RealtimeEvent {
        let payload = serde_json::to_value(report).expect("report serializes");
        RealtimeEvent::updated(EntityKind::Report, report.report_id.as_uuid(), payload)
    }

    /// A realtime `created` frame carrying the given comment.
    pub fn comment_created_event(comment: &Comment) -> RealtimeEvent {
        let payload = serde_json::to_value(comment).expect("comment serializes");
        RealtimeEvent::created(EntityKind::Comment, comment.comment_id.as_uuid(), payload)
    }

    /// A realtime `updated` frame carrying the given comment.
    pub fn comment_updated_event(comment: &Comment) -> RealtimeEvent {
        let payload = serde_json::to_value(comment).expect("comment serializes");
        RealtimeEvent::updated(EntityKind::Comment, comment.comment_id.as_uuid(), payload)
    }

    /// A realtime `created` frame carrying the given badge.
    pub fn badge_created_event(badge: &Badge) -> RealtimeEvent {
        let payload = serde_json::to_value(badge).expect("badge serializes");
        RealtimeEvent::created(EntityKind::Badge, badge.badge_id.as_uuid(), payload)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for RIPPLE-specific validation.

    use super::*;
    use std::fmt::Debug;

    /// Assert that a SyncResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: Debug>(result: &SyncResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a SyncResult is Err.
    #[track_caller]
    pub fn assert_err<T: Debug>(result: &SyncResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a result failed because identity is not resolved yet.
    #[track_caller]
    pub fn assert_not_ready<T: Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.is_identity_not_ready() => {}
            other => panic!("Expected identity-not-ready error, got: {:?}", other),
        }
    }

    /// Assert that a result failed for auth reasons (read-only or unauthorized).
    #[track_caller]
    pub fn assert_auth_required<T: Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.is_auth_required() => {}
            other => panic!("Expected auth-required error, got: {:?}", other),
        }
    }

    /// Assert that a result failed with a transport-level network error.
    #[track_caller]
    pub fn assert_network_failure<T: Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.is_network_failure() => {}
            other => panic!("Expected network failure, got: {:?}", other),
        }
    }

    /// Assert that a result failed because the server rejected the write.
    #[track_caller]
    pub fn assert_conflict<T: Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.is_conflict() => {}
            other => panic!("Expected server rejection, got: {:?}", other),
        }
    }

    /// Assert that a mutation went to the server and committed.
    #[track_caller]
    pub fn assert_committed<T: Debug>(outcome: &MutationOutcome<T>) {
        assert!(
            !outcome.is_race_skipped(),
            "Expected committed outcome, got race-skip: {:?}",
            outcome
        );
    }

    /// Assert that a mutation settled locally without a transport call.
    #[track_caller]
    pub fn assert_race_skipped<T: Debug>(outcome: &MutationOutcome<T>) {
        assert!(
            outcome.is_race_skipped(),
            "Expected race-skipped outcome, got: {:?}",
            outcome
        );
    }

    /// Assert that a realtime merge was ignored for the given reason.
    #[track_caller]
    pub fn assert_merge_ignored(outcome: &MergeOutcome, reason: IgnoreReason) {
        match outcome {
            MergeOutcome::Ignored(got) if *got == reason => {}
            other => panic!("Expected merge ignored as {:?}, got: {:?}", reason, other),
        }
    }

    /// Assert that the engine caches exactly the given number of each kind.
    #[track_caller]
    pub fn assert_store_counts(
        engine: &SessionEngine,
        reports: usize,
        comments: usize,
        badges: usize,
    ) {
        let counts = engine.counts().expect("engine lock poisoned");
        assert_eq!(counts.reports, reports, "Report count mismatch: {:?}", counts);
        assert_eq!(
            counts.comments, comments,
            "Comment count mismatch: {:?}",
            counts
        );
        assert_eq!(counts.badges, badges, "Badge count mismatch: {:?}", counts);
    }

    /// Assert that the engine has no writes awaiting confirmation.
    #[track_caller]
    pub fn assert_no_pending_writes(engine: &SessionEngine) {
        let counts = engine.counts().expect("engine lock poisoned");
        assert_eq!(
            counts.pending_writes, 0,
            "Expected no pending writes, got {}",
            counts.pending_writes
        );
    }

    /// Assert that a report is still awaiting server confirmation.
    #[track_caller]
    pub fn assert_report_speculative(report: &Report) {
        assert!(
            report.speculative,
            "Expected speculative report, got confirmed: {}",
            report.report_id
        );
    }

    /// Assert that a report has been confirmed by the server.
    #[track_caller]
    pub fn assert_report_confirmed(report: &Report) {
        assert!(
            !report.speculative,
            "Expected confirmed report, got speculative: {}",
            report.report_id
        );
    }

    /// Assert that a comment is still awaiting server confirmation.
    #[track_caller]
    pub fn assert_comment_speculative(comment: &Comment) {
        assert!(
            comment.speculative,
            "Expected speculative comment, got confirmed: {}",
            comment.comment_id
        );
    }

    /// Assert that a comment has been confirmed by the server.
    #[track_caller]
    pub fn assert_comment_confirmed(comment: &Comment) {
        assert!(
            !comment.speculative,
            "Expected confirmed comment, got speculative: {}",
            comment.comment_id
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
