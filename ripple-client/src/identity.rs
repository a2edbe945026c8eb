//! Cached identity resolver for live sessions.
//!
//! The engine consults the resolver synchronously on every mutation; this
//! adapter keeps the last-known identity in a slot the session layer fills
//! at login and empties at logout. Issuance and refresh stay external.

use crate::error::ClientError;
use crate::http::HttpTransport;
use ripple_core::{IdentityError, LocalIdentity};
use ripple_engine::IdentityResolver;
use std::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct SessionIdentity {
    current: RwLock<Option<LocalIdentity>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: LocalIdentity) {
        if let Ok(mut slot) = self.current.write() {
            info!(actor_id = %identity.actor_id, "identity set");
            *slot = Some(identity);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.current.write() {
            info!("identity cleared");
            *slot = None;
        }
    }

    /// Populate the slot from `GET /api/identity/me`.
    pub async fn fetch(&self, http: &HttpTransport) -> Result<LocalIdentity, ClientError> {
        let identity = http.fetch_identity().await?;
        self.set(identity.clone());
        Ok(identity)
    }
}

impl IdentityResolver for SessionIdentity {
    fn resolve_current(&self) -> Result<LocalIdentity, IdentityError> {
        match self.current.read() {
            Ok(slot) => slot.clone().ok_or(IdentityError::NotReady),
            Err(_) => Err(IdentityError::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::ActorId;

    #[test]
    fn test_empty_slot_is_not_ready() {
        let identity = SessionIdentity::new();
        assert_eq!(identity.resolve_current(), Err(IdentityError::NotReady));
    }

    #[test]
    fn test_set_then_clear_round_trip() {
        let slot = SessionIdentity::new();
        let identity = LocalIdentity::new(ActorId::generate(), "ada");
        slot.set(identity.clone());
        assert_eq!(slot.resolve_current(), Ok(identity));
        slot.clear();
        assert_eq!(slot.resolve_current(), Err(IdentityError::NotReady));
    }

    #[test]
    fn test_set_replaces_previous_identity() {
        let slot = SessionIdentity::new();
        slot.set(LocalIdentity::new(ActorId::generate(), "ada"));
        let second = LocalIdentity::new(ActorId::generate(), "sam");
        slot.set(second.clone());
        assert_eq!(slot.resolve_current(), Ok(second));
    }
}
