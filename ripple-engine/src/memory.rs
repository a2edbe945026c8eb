//! In-memory transport implementation for testing.
//!
//! A miniature server: holds rows seeded by tests (or accumulated from
//! creates), echoes authoritative responses, and exposes the levers the
//! test suites need:
//!
//! - `calls()` records every operation, so race-guard tests can assert the
//!   network was never touched;
//! - `fail_next(op, err)` scripts a one-shot failure for the next call of
//!   that operation;
//! - `hold(op)` parks the next call of that operation until the returned
//!   handle is released, which lets a test slip a realtime event between
//!   optimistic apply and commit deterministically, without sleeps.

use crate::transport::FeedTransport;
use async_trait::async_trait;
use ripple_core::{
    ActorId, Badge, Comment, CommentId, CommentPatch, FeedOp, Report, ReportId, ReportPatch,
    TransportError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Releases one held transport call. Releasing before the call arrives is
/// fine: the permit is stored.
pub struct HoldHandle {
    notify: Arc<Notify>,
}

impl HoldHandle {
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[derive(Default)]
pub struct MemoryTransport {
    reports: Mutex<HashMap<ReportId, Report>>,
    comments: Mutex<HashMap<CommentId, Comment>>,
    badges: Mutex<HashMap<ActorId, Vec<Badge>>>,
    calls: Mutex<Vec<FeedOp>>,
    failures: Mutex<HashMap<FeedOp, TransportError>>,
    holds: Mutex<HashMap<FeedOp, Arc<Notify>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // TEST LEVERS
    // ========================================================================

    /// Seed server-side report rows (stored confirmed).
    pub fn seed_reports(&self, rows: Vec<Report>) {
        let mut reports = self.reports.lock().unwrap();
        for row in rows {
            reports.insert(row.report_id, row.confirmed());
        }
    }

    /// Seed server-side comment rows (stored confirmed).
    pub fn seed_comments(&self, rows: Vec<Comment>) {
        let mut comments = self.comments.lock().unwrap();
        for row in rows {
            comments.insert(row.comment_id, row.confirmed());
        }
    }

    pub fn seed_badges(&self, actor_id: ActorId, rows: Vec<Badge>) {
        self.badges.lock().unwrap().insert(actor_id, rows);
    }

    /// Script the next call of `op` to fail with `err`.
    pub fn fail_next(&self, op: FeedOp, err: TransportError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    /// Park the next call of `op` until the handle is released.
    pub fn hold(&self, op: FeedOp) -> HoldHandle {
        let notify = Arc::new(Notify::new());
        self.holds.lock().unwrap().insert(op, Arc::clone(&notify));
        HoldHandle { notify }
    }

    /// Every operation invoked so far, in order.
    pub fn calls(&self) -> Vec<FeedOp> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: FeedOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Server-side row inspection for assertions.
    pub fn report_row(&self, id: &ReportId) -> Option<Report> {
        self.reports.lock().unwrap().get(id).cloned()
    }

    pub fn comment_row(&self, id: &CommentId) -> Option<Comment> {
        self.comments.lock().unwrap().get(id).cloned()
    }

    // ========================================================================
    // CALL PLUMBING
    // ========================================================================

    /// Record the call, wait out any hold, surface any scripted failure.
    async fn enter(&self, op: FeedOp) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(op);
        let gate = self.holds.lock().unwrap().remove(&op);
        if let Some(notify) = gate {
            notify.notified().await;
        }
        match self.failures.lock().unwrap().remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(op: FeedOp) -> TransportError {
        TransportError::Rejected {
            op,
            code: "not_found".to_string(),
            message: "no such row".to_string(),
        }
    }
}

#[async_trait]
impl FeedTransport for MemoryTransport {
    async fn create_report(&self, report: &Report) -> Result<Report, TransportError> {
        self.enter(FeedOp::CreateReport).await?;
        let confirmed = report.clone().confirmed();
        self.reports
            .lock()
            .unwrap()
            .insert(confirmed.report_id, confirmed.clone());
        Ok(confirmed)
    }

    async fn update_report(
        &self,
        id: ReportId,
        patch: &ReportPatch,
    ) -> Result<Report, TransportError> {
        self.enter(FeedOp::UpdateReport).await?;
        let mut reports = self.reports.lock().unwrap();
        let report = reports
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::UpdateReport))?;
        patch.apply_to(report);
        report.updated_at = chrono::Utc::now();
        Ok(report.clone())
    }

    async fn delete_report(&self, id: ReportId) -> Result<(), TransportError> {
        self.enter(FeedOp::DeleteReport).await?;
        self.reports.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn set_report_upvote(
        &self,
        id: ReportId,
        upvoted: bool,
    ) -> Result<Report, TransportError> {
        self.enter(FeedOp::SetReportUpvote).await?;
        let mut reports = self.reports.lock().unwrap();
        let report = reports
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::SetReportUpvote))?;
        if report.upvoted != upvoted {
            report.upvoted = upvoted;
            report.upvotes_count += if upvoted { 1 } else { -1 };
        }
        Ok(report.clone())
    }

    async fn set_report_flag(
        &self,
        id: ReportId,
        flagged: bool,
    ) -> Result<Report, TransportError> {
        self.enter(FeedOp::SetReportFlag).await?;
        let mut reports = self.reports.lock().unwrap();
        let report = reports
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::SetReportFlag))?;
        report.flagged = flagged;
        Ok(report.clone())
    }

    async fn create_comment(&self, comment: &Comment) -> Result<Comment, TransportError> {
        self.enter(FeedOp::CreateComment).await?;
        let confirmed = comment.clone().confirmed();
        self.comments
            .lock()
            .unwrap()
            .insert(confirmed.comment_id, confirmed.clone());
        if let Some(report) = self
            .reports
            .lock()
            .unwrap()
            .get_mut(&confirmed.report_id)
        {
            report.comments_count += 1;
        }
        Ok(confirmed)
    }

    async fn update_comment(
        &self,
        id: CommentId,
        patch: &CommentPatch,
    ) -> Result<Comment, TransportError> {
        self.enter(FeedOp::UpdateComment).await?;
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::UpdateComment))?;
        patch.apply_to(comment);
        comment.updated_at = chrono::Utc::now();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), TransportError> {
        self.enter(FeedOp::DeleteComment).await?;
        let removed = self.comments.lock().unwrap().remove(&id);
        if let Some(comment) = removed {
            if let Some(report) = self.reports.lock().unwrap().get_mut(&comment.report_id) {
                report.comments_count -= 1;
            }
        }
        Ok(())
    }

    async fn set_comment_like(
        &self,
        id: CommentId,
        liked: bool,
    ) -> Result<Comment, TransportError> {
        self.enter(FeedOp::SetCommentLike).await?;
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::SetCommentLike))?;
        if comment.liked != liked {
            comment.liked = liked;
            comment.like_count += if liked { 1 } else { -1 };
        }
        Ok(comment.clone())
    }

    async fn set_comment_pin(
        &self,
        id: CommentId,
        pinned: bool,
    ) -> Result<Comment, TransportError> {
        self.enter(FeedOp::SetCommentPin).await?;
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .get_mut(&id)
            .ok_or_else(|| Self::missing(FeedOp::SetCommentPin))?;
        comment.pinned = pinned;
        comment.pinned_at = if pinned { Some(chrono::Utc::now()) } else { None };
        Ok(comment.clone())
    }

    async fn fetch_feed(&self) -> Result<Vec<Report>, TransportError> {
        self.enter(FeedOp::FetchFeed).await?;
        Ok(self.reports.lock().unwrap().values().cloned().collect())
    }

    async fn fetch_comments(&self, report_id: ReportId) -> Result<Vec<Comment>, TransportError> {
        self.enter(FeedOp::FetchComments).await?;
        Ok(self
            .comments
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.report_id == report_id)
            .cloned()
            .collect())
    }

    async fn fetch_badges(&self, actor_id: ActorId) -> Result<Vec<Badge>, TransportError> {
        self.enter(FeedOp::FetchBadges).await?;
        Ok(self
            .badges
            .lock()
            .unwrap()
            .get(&actor_id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{CommentDraft, LocalIdentity, ReportCategory, ReportDraft};

    fn identity() -> LocalIdentity {
        LocalIdentity::new(ActorId::generate(), "ada")
    }

    fn report() -> Report {
        Report::speculative(
            ReportDraft {
                title: "Leak".to_string(),
                body: "Hydrant".to_string(),
                category: ReportCategory::Infrastructure,
            },
            &identity(),
        )
    }

    #[tokio::test]
    async fn test_create_echoes_confirmed_with_same_id() {
        let transport = MemoryTransport::new();
        let speculative = report();
        let id = speculative.report_id;
        let confirmed = transport.create_report(&speculative).await.unwrap();
        assert_eq!(confirmed.report_id, id);
        assert!(!confirmed.speculative);
        assert_eq!(transport.calls(), vec![FeedOp::CreateReport]);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let transport = MemoryTransport::new();
        transport.fail_next(
            FeedOp::FetchFeed,
            TransportError::Network {
                op: FeedOp::FetchFeed,
                message: "down".to_string(),
            },
        );
        assert!(transport.fetch_feed().await.is_err());
        assert!(transport.fetch_feed().await.is_ok());
    }

    #[tokio::test]
    async fn test_hold_parks_until_release() {
        let transport = Arc::new(MemoryTransport::new());
        let handle = transport.hold(FeedOp::FetchFeed);

        let fetcher = Arc::clone(&transport);
        let task = tokio::spawn(async move { fetcher.fetch_feed().await });
        // the call is recorded immediately even while parked
        tokio::task::yield_now().await;
        assert_eq!(transport.calls_of(FeedOp::FetchFeed), 1);
        assert!(!task.is_finished());

        handle.release();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_comment_create_bumps_server_parent_count() {
        let transport = MemoryTransport::new();
        let parent = report().confirmed();
        let parent_id = parent.report_id;
        transport.seed_reports(vec![parent]);

        let comment = Comment::speculative(
            CommentDraft {
                report_id: parent_id,
                parent_id: None,
                body: "on it".to_string(),
            },
            &identity(),
            false,
        );
        transport.create_comment(&comment).await.unwrap();
        assert_eq!(transport.report_row(&parent_id).unwrap().comments_count, 1);

        transport.delete_comment(comment.comment_id).await.unwrap();
        assert_eq!(transport.report_row(&parent_id).unwrap().comments_count, 0);
    }

    #[tokio::test]
    async fn test_set_like_is_idempotent() {
        let transport = MemoryTransport::new();
        let comment = Comment::speculative(
            CommentDraft {
                report_id: ReportId::generate(),
                parent_id: None,
                body: "nice".to_string(),
            },
            &identity(),
            false,
        );
        let id = comment.comment_id;
        transport.seed_comments(vec![comment]);

        let once = transport.set_comment_like(id, true).await.unwrap();
        assert_eq!(once.like_count, 1);
        let twice = transport.set_comment_like(id, true).await.unwrap();
        assert_eq!(twice.like_count, 1);
    }
}
