//! RIPPLE Engine - Session Cache and Optimistic Mutations
//!
//! The client-resident half of the feed: an in-memory entity store with
//! revision tracking, ordered list projections over it, and a mutation
//! coordinator that applies every write optimistically, confirms it against
//! the transport, and rolls it back structurally when the server refuses.
//!
//! One `SessionEngine` owns all session state behind a single lock. Reads
//! clone out of it, writers follow the snapshot/apply/commit-or-rollback
//! lifecycle in [`coordinator`], server pushes fold in through
//! [`reconcile`], and every visible change fans out on the [`changes`]
//! broadcast bus after the lock is released.

mod counters;
mod ordering;
mod race;
mod snapshot;

pub mod changes;
pub mod coordinator;
pub mod engine;
pub mod identity;
pub mod loader;
pub mod memory;
pub mod projection;
pub mod reconcile;
pub mod store;
pub mod transport;

pub use changes::{ChangeBus, ChangeKind, StoreChange};
pub use coordinator::{FieldSet, MutationOutcome, MutationPhase, PendingWrites};
pub use engine::{CounterHook, SessionEngine, StoreCounts};
pub use identity::{IdentityGate, IdentityResolver, StaticIdentity};
pub use loader::{LoadTicket, LoadTracker};
pub use memory::{HoldHandle, MemoryTransport};
pub use projection::{ListProjections, ProjectionKey};
pub use reconcile::{run_realtime, IgnoreReason, MergeOutcome};
pub use store::{EntityStore, Revision};
pub use transport::FeedTransport;
