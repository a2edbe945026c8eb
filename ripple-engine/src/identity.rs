//! Identity gate
//!
//! Every optimistic write begins by resolving the local identity; a
//! mutation proposed before the session layer has resolved who is acting
//! fails fast with no side effects anywhere. Reads, fetches, and realtime
//! merges are not gated: a signed-out viewer still sees the feed move.

use ripple_core::{ActorRole, IdentityError, LocalIdentity};
use std::sync::{Arc, RwLock};

/// Adapter over the externally-owned auth/session service. Resolution is
/// synchronous: the session layer either has an identity cached or it does
/// not, and the gate never waits for one.
pub trait IdentityResolver: Send + Sync {
    fn resolve_current(&self) -> Result<LocalIdentity, IdentityError>;
}

/// The gate the mutation coordinator consults before touching any state.
pub struct IdentityGate {
    resolver: Arc<dyn IdentityResolver>,
}

impl IdentityGate {
    pub fn new(resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { resolver }
    }

    /// Resolve the current identity, or fail with `NotReady`.
    pub fn ensure_ready(&self) -> Result<LocalIdentity, IdentityError> {
        self.resolver.resolve_current()
    }

    /// Resolve AND require write capability. Read-only sessions fail here,
    /// before any optimistic state exists.
    pub fn ensure_writable(&self) -> Result<LocalIdentity, IdentityError> {
        let identity = self.ensure_ready()?;
        match identity.role {
            ActorRole::Member => Ok(identity),
            ActorRole::ReadOnly => Err(IdentityError::ReadOnly {
                alias: identity.alias,
            }),
        }
    }
}

/// Resolver backed by a settable slot. The embedding application (or a
/// test) sets the identity at login and clears it at logout.
#[derive(Default)]
pub struct StaticIdentity {
    current: RwLock<Option<LocalIdentity>>,
}

impl StaticIdentity {
    /// Starts unresolved.
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// Starts resolved.
    pub fn ready(identity: LocalIdentity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn set(&self, identity: LocalIdentity) {
        if let Ok(mut slot) = self.current.write() {
            *slot = Some(identity);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.current.write() {
            *slot = None;
        }
    }
}

impl IdentityResolver for StaticIdentity {
    fn resolve_current(&self) -> Result<LocalIdentity, IdentityError> {
        match self.current.read() {
            Ok(slot) => slot.clone().ok_or(IdentityError::NotReady),
            Err(_) => Err(IdentityError::NotReady),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
