//! Typed entity identifiers
//!
//! Every entity ID is a UUIDv7 newtype. UUIDv7 embeds a Unix timestamp, so
//! IDs are naturally sortable by creation time, and they are minted by the
//! proposing client rather than the server: a speculative record keeps the
//! same ID once the server confirms it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Mint a fresh timestamp-sortable ID.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// The nil ID (all zeros).
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a posted report.
    ReportId
);
define_id!(
    /// Identifier of a comment under a report.
    CommentId
);
define_id!(
    /// Identifier of an awarded badge.
    BadgeId
);
define_id!(
    /// Identifier of an actor (a person using the feed).
    ActorId
);

/// Entity kind discriminator for polymorphic references.
///
/// Serializes lowercase to match the realtime wire contract
/// (`"report"` / `"comment"` / `"badge"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Report,
    Comment,
    Badge,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Report => "report",
            EntityKind::Comment => "comment",
            EntityKind::Badge => "badge",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================
