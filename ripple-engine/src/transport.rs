//! Feed transport trait
//!
//! The seam between the engine and the server. The engine calls exactly one
//! transport method per mutation, with the state lock released, and treats
//! the response as authoritative.
//!
//! # Collaborator contract
//!
//! - Creates send the full speculative record; the SERVER MUST accept and
//!   persist the client-chosen ID. The ID in the response equals the ID in
//!   the request; confirmation replaces the record in place, it never
//!   re-keys it.
//! - Toggles send the desired absolute state (`liked = true`), never
//!   "flip", so a retried or duplicated request is idempotent.
//! - Responses carry the full authoritative record, including
//!   server-computed counters.
//! - Fetches return complete ordered-agnostic row sets; ordering is the
//!   engine's job.

use async_trait::async_trait;
use ripple_core::{
    ActorId, Badge, Comment, CommentId, CommentPatch, Report, ReportId, ReportPatch,
    TransportError,
};

#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn create_report(&self, report: &Report) -> Result<Report, TransportError>;
    async fn update_report(
        &self,
        id: ReportId,
        patch: &ReportPatch,
    ) -> Result<Report, TransportError>;
    async fn delete_report(&self, id: ReportId) -> Result<(), TransportError>;
    async fn set_report_upvote(&self, id: ReportId, upvoted: bool)
        -> Result<Report, TransportError>;
    async fn set_report_flag(&self, id: ReportId, flagged: bool)
        -> Result<Report, TransportError>;

    async fn create_comment(&self, comment: &Comment) -> Result<Comment, TransportError>;
    async fn update_comment(
        &self,
        id: CommentId,
        patch: &CommentPatch,
    ) -> Result<Comment, TransportError>;
    async fn delete_comment(&self, id: CommentId) -> Result<(), TransportError>;
    async fn set_comment_like(
        &self,
        id: CommentId,
        liked: bool,
    ) -> Result<Comment, TransportError>;
    async fn set_comment_pin(
        &self,
        id: CommentId,
        pinned: bool,
    ) -> Result<Comment, TransportError>;

    async fn fetch_feed(&self) -> Result<Vec<Report>, TransportError>;
    async fn fetch_comments(&self, report_id: ReportId) -> Result<Vec<Comment>, TransportError>;
    async fn fetch_badges(&self, actor_id: ActorId) -> Result<Vec<Badge>, TransportError>;
}
