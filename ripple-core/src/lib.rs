//! RIPPLE Core - Entity Types
//!
//! Pure data structures for the feed sync engine. All other crates depend on
//! this one; it contains no I/O, no locks, and no engine behavior - just the
//! entities, their drafts and patches, the realtime wire types, and the
//! error taxonomy.

pub mod counters;
pub mod entities;
pub mod error;
pub mod events;
pub mod identity;
pub mod ids;

pub use counters::{CounterDelta, CounterField};
pub use entities::{
    Author, Badge, BadgeKind, Comment, CommentDraft, CommentPatch, Report, ReportCategory,
    ReportDraft, ReportPatch, ReportStatus,
};
pub use error::{IdentityError, MutationError, SyncError, SyncResult, TransportError};
pub use events::{FeedOp, RealtimeAction, RealtimeEvent};
pub use identity::{ActorRole, LocalIdentity};
pub use ids::{ActorId, BadgeId, CommentId, EntityKind, ReportId, Timestamp};
