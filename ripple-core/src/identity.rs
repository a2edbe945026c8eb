//! Resolved local identity
//!
//! Identity issuance and refresh live outside this workspace; the engine
//! only consumes an already-resolved identity. The resolver seam is defined
//! in `ripple-engine`.

use crate::ids::ActorId;
use serde::{Deserialize, Serialize};

/// What the feed knows about the current actor once the session layer has
/// resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub actor_id: ActorId,
    pub alias: String,
    pub avatar_url: Option<String>,
    pub role: ActorRole,
}

/// Write capability of the current actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Full participant: may create, edit, and react.
    Member,
    /// May browse and receive realtime updates, but never mutate.
    ReadOnly,
}

impl LocalIdentity {
    pub fn new(actor_id: ActorId, alias: &str) -> Self {
        Self {
            actor_id,
            alias: alias.to_string(),
            avatar_url: None,
            role: ActorRole::Member,
        }
    }

    pub fn with_avatar(mut self, url: &str) -> Self {
        self.avatar_url = Some(url.to_string());
        self
    }

    pub fn with_role(mut self, role: ActorRole) -> Self {
        self.role = role;
        self
    }

    pub fn can_write(&self) -> bool {
        matches!(self.role, ActorRole::Member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_can_write() {
        let id = LocalIdentity::new(ActorId::generate(), "ada");
        assert!(id.can_write());
    }

    #[test]
    fn test_read_only_cannot_write() {
        let id = LocalIdentity::new(ActorId::generate(), "guest").with_role(ActorRole::ReadOnly);
        assert!(!id.can_write());
    }

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ActorRole::ReadOnly).unwrap(),
            "\"read_only\""
        );
    }
}
