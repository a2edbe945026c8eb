//! Core entity structures
//!
//! Pure data for the three cached entity kinds plus the payloads that feed
//! them (drafts from the UI, patches toward the server). No behavior beyond
//! construction and field merging lives here.
//!
//! Counters (`comments_count`, `upvotes_count`, `like_count`) are
//! denormalized server-side aggregates. Locally they move only through the
//! engine's counter propagator, which is why the patch structs carry flag
//! fields but no counter fields.

use crate::identity::LocalIdentity;
use crate::ids::{ActorId, BadgeId, CommentId, ReportId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// EMBEDDED AUTHOR
// ============================================================================

/// Author info embedded in reports and comments.
///
/// `is_owner` is computed against the parent report's owner: on a comment it
/// marks "this commenter posted the report", on a report it is simply true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub actor_id: ActorId,
    pub alias: String,
    pub avatar_url: Option<String>,
    pub is_owner: bool,
}

impl Author {
    pub fn from_identity(identity: &LocalIdentity, is_owner: bool) -> Self {
        Self {
            actor_id: identity.actor_id,
            alias: identity.alias.clone(),
            avatar_url: identity.avatar_url.clone(),
            is_owner,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// Category of a posted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Infrastructure,
    Safety,
    Environment,
    Noise,
    Other,
}

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    InProgress,
    Resolved,
}

/// A posted neighborhood report. Top-level feed entity and the parent
/// aggregate for comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: ReportId,
    pub author: Author,
    pub title: String,
    pub body: String,
    pub category: ReportCategory,
    pub status: ReportStatus,
    pub comments_count: i32,
    pub upvotes_count: i32,
    /// Whether the current viewer has upvoted this report.
    pub upvoted: bool,
    /// Whether the current viewer has flagged this report for moderation.
    pub flagged: bool,
    pub pinned: bool,
    /// Locally created or modified, not yet confirmed by the server.
    /// Never present on the wire.
    #[serde(default, skip_serializing)]
    pub speculative: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl Report {
    /// Build the speculative record for an optimistic create. The ID is
    /// minted here, client-side, and stays stable through confirmation.
    pub fn speculative(draft: ReportDraft, identity: &LocalIdentity) -> Self {
        let now = Utc::now();
        Self {
            report_id: ReportId::generate(),
            author: Author::from_identity(identity, true),
            title: draft.title,
            body: draft.body,
            category: draft.category,
            status: ReportStatus::Open,
            comments_count: 0,
            upvotes_count: 0,
            upvoted: false,
            flagged: false,
            pinned: false,
            speculative: true,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Mark as server-confirmed.
    pub fn confirmed(mut self) -> Self {
        self.speculative = false;
        self
    }
}

/// What the application supplies to create a report. Everything else
/// (ID, author, timestamps, counters) is filled in by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub title: String,
    pub body: String,
    pub category: ReportCategory,
}

/// Partial update for a report. `None` leaves a field untouched; a patch
/// against an ID that is not cached is a no-op and never creates a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<ReportCategory>,
    pub status: Option<ReportStatus>,
    pub resolved_at: Option<Option<Timestamp>>,
    pub pinned: Option<bool>,
    pub upvoted: Option<bool>,
    pub flagged: Option<bool>,
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.category.is_none()
            && self.status.is_none()
            && self.resolved_at.is_none()
            && self.pinned.is_none()
            && self.upvoted.is_none()
            && self.flagged.is_none()
    }

    /// Merge the named fields into `report`. Timestamp maintenance is the
    /// store's job, not the patch's.
    pub fn apply_to(&self, report: &mut Report) {
        if let Some(title) = &self.title {
            report.title = title.clone();
        }
        if let Some(body) = &self.body {
            report.body = body.clone();
        }
        if let Some(category) = self.category {
            report.category = category;
        }
        if let Some(status) = self.status {
            report.status = status;
        }
        if let Some(resolved_at) = self.resolved_at {
            report.resolved_at = resolved_at;
        }
        if let Some(pinned) = self.pinned {
            report.pinned = pinned;
        }
        if let Some(upvoted) = self.upvoted {
            report.upvoted = upvoted;
        }
        if let Some(flagged) = self.flagged {
            report.flagged = flagged;
        }
    }
}

// ============================================================================
// COMMENT
// ============================================================================

/// A threaded comment under a report. `parent_id` is set for replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: CommentId,
    pub report_id: ReportId,
    pub parent_id: Option<CommentId>,
    pub author: Author,
    pub body: String,
    pub like_count: i32,
    /// Whether the current viewer has liked this comment.
    pub liked: bool,
    pub pinned: bool,
    pub pinned_at: Option<Timestamp>,
    /// Locally created or modified, not yet confirmed by the server.
    /// Never present on the wire.
    #[serde(default, skip_serializing)]
    pub speculative: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Comment {
    /// Build the speculative record for an optimistic create.
    ///
    /// `is_owner` marks whether the commenting actor owns the parent report;
    /// the engine computes it from the cached report.
    pub fn speculative(draft: CommentDraft, identity: &LocalIdentity, is_owner: bool) -> Self {
        let now = Utc::now();
        Self {
            comment_id: CommentId::generate(),
            report_id: draft.report_id,
            parent_id: draft.parent_id,
            author: Author::from_identity(identity, is_owner),
            body: draft.body,
            like_count: 0,
            liked: false,
            pinned: false,
            pinned_at: None,
            speculative: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as server-confirmed.
    pub fn confirmed(mut self) -> Self {
        self.speculative = false;
        self
    }

    /// Sort key for the pinned band: most recent pin-or-update wins.
    pub fn pin_rank(&self) -> Timestamp {
        match self.pinned_at {
            Some(pinned_at) => pinned_at.max(self.updated_at),
            None => self.updated_at,
        }
    }
}

/// What the application supplies to create a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub report_id: ReportId,
    pub parent_id: Option<CommentId>,
    pub body: String,
}

/// Partial update for a comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentPatch {
    pub body: Option<String>,
    pub pinned: Option<bool>,
    pub pinned_at: Option<Option<Timestamp>>,
    pub liked: Option<bool>,
}

impl CommentPatch {
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.pinned.is_none()
            && self.pinned_at.is_none()
            && self.liked.is_none()
    }

    pub fn apply_to(&self, comment: &mut Comment) {
        if let Some(body) = &self.body {
            comment.body = body.clone();
        }
        if let Some(pinned) = self.pinned {
            comment.pinned = pinned;
        }
        if let Some(pinned_at) = self.pinned_at {
            comment.pinned_at = pinned_at;
        }
        if let Some(liked) = self.liked {
            comment.liked = liked;
        }
    }
}

// ============================================================================
// BADGE
// ============================================================================

/// Recognition kinds the evaluator can award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    FirstReport,
    FirstComment,
    HelpfulNeighbor,
    ReportResolved,
    WeekStreak,
}

/// A badge awarded to an actor. Read-only from the client's point of view:
/// badges are minted by the server-side evaluator and arrive via fetches and
/// realtime `created` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub badge_id: BadgeId,
    pub actor_id: ActorId,
    pub kind: BadgeKind,
    pub label: String,
    pub points: i32,
    #[serde(default, skip_serializing)]
    pub speculative: bool,
    pub awarded_at: Timestamp,
}

impl Badge {
    /// Mark as server-acknowledged.
    pub fn confirmed(mut self) -> Self {
        self.speculative = false;
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
