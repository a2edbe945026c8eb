//! Realtime event wire types and transport operation names
//!
//! The realtime channel pushes one JSON object per entity change:
//!
//! ```json
//! { "entityType": "comment",
//!   "entityId": "0192f7a8-...",
//!   "action": "created",
//!   "payload": { ... } }
//! ```
//!
//! `payload` carries the full authoritative record for `created` and
//! `updated` and is absent for `deleted`. The payload stays an opaque
//! `serde_json::Value` here; the reconciler decodes it against the concrete
//! entity type named by `entityType`.

use crate::ids::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// What happened to the entity on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeAction {
    Created,
    Updated,
    Deleted,
}

impl RealtimeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeAction::Created => "created",
            RealtimeAction::Updated => "updated",
            RealtimeAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for RealtimeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server-pushed entity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub entity_type: EntityKind,
    pub entity_id: Uuid,
    pub action: RealtimeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RealtimeEvent {
    pub fn created(entity_type: EntityKind, entity_id: Uuid, payload: Value) -> Self {
        Self {
            entity_type,
            entity_id,
            action: RealtimeAction::Created,
            payload: Some(payload),
        }
    }

    pub fn updated(entity_type: EntityKind, entity_id: Uuid, payload: Value) -> Self {
        Self {
            entity_type,
            entity_id,
            action: RealtimeAction::Updated,
            payload: Some(payload),
        }
    }

    pub fn deleted(entity_type: EntityKind, entity_id: Uuid) -> Self {
        Self {
            entity_type,
            entity_id,
            action: RealtimeAction::Deleted,
            payload: None,
        }
    }

    /// `created` and `updated` must carry the authoritative record.
    pub fn expects_payload(&self) -> bool {
        !matches!(self.action, RealtimeAction::Deleted)
    }
}

/// Names of the transport operations, for error messages, call logs, and
/// tracing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedOp {
    CreateReport,
    UpdateReport,
    DeleteReport,
    SetReportUpvote,
    SetReportFlag,
    CreateComment,
    UpdateComment,
    DeleteComment,
    SetCommentLike,
    SetCommentPin,
    FetchFeed,
    FetchComments,
    FetchBadges,
}

impl FeedOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedOp::CreateReport => "create-report",
            FeedOp::UpdateReport => "update-report",
            FeedOp::DeleteReport => "delete-report",
            FeedOp::SetReportUpvote => "set-report-upvote",
            FeedOp::SetReportFlag => "set-report-flag",
            FeedOp::CreateComment => "create-comment",
            FeedOp::UpdateComment => "update-comment",
            FeedOp::DeleteComment => "delete-comment",
            FeedOp::SetCommentLike => "set-comment-like",
            FeedOp::SetCommentPin => "set-comment-pin",
            FeedOp::FetchFeed => "fetch-feed",
            FeedOp::FetchComments => "fetch-comments",
            FeedOp::FetchBadges => "fetch-badges",
        }
    }

    /// Whether a committed call of this op can move counters somewhere.
    pub fn affects_counters(&self) -> bool {
        matches!(
            self,
            FeedOp::CreateComment
                | FeedOp::DeleteComment
                | FeedOp::SetCommentLike
                | FeedOp::SetReportUpvote
        )
    }
}

impl fmt::Display for FeedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let id = Uuid::now_v7();
        let event = RealtimeEvent::created(EntityKind::Comment, id, json!({"body": "hi"}));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["entityType"], "comment");
        assert_eq!(wire["entityId"], id.to_string());
        assert_eq!(wire["action"], "created");
        assert_eq!(wire["payload"]["body"], "hi");
    }

    #[test]
    fn test_deleted_event_omits_payload() {
        let event = RealtimeEvent::deleted(EntityKind::Report, Uuid::now_v7());
        let wire = serde_json::to_string(&event).unwrap();
        assert!(!wire.contains("payload"));
        assert!(!event.expects_payload());
    }

    #[test]
    fn test_event_round_trip() {
        let event = RealtimeEvent::updated(
            EntityKind::Badge,
            Uuid::now_v7(),
            json!({"points": 10}),
        );
        let wire = serde_json::to_string(&event).unwrap();
        let back: RealtimeEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_decodes_bare_server_frame() {
        let frame = r#"{
            "entityType": "report",
            "entityId": "00000000-0000-0000-0000-000000000000",
            "action": "deleted"
        }"#;
        let event: RealtimeEvent = serde_json::from_str(frame).unwrap();
        assert_eq!(event.action, RealtimeAction::Deleted);
        assert!(event.payload.is_none());
    }

    #[test]
    fn test_feed_op_names() {
        assert_eq!(FeedOp::SetCommentLike.to_string(), "set-comment-like");
        assert!(FeedOp::CreateComment.affects_counters());
        assert!(!FeedOp::UpdateComment.affects_counters());
        assert!(!FeedOp::SetCommentPin.affects_counters());
    }
}
