//! List projections
//!
//! Ordered views over the entity store, one per context key. A projection
//! holds entity IDs only - never record copies - so there is exactly one
//! copy of truth per entity and a store write is instantly visible through
//! every projection that references it.
//!
//! A key that was never materialized is distinct from a key holding an empty
//! list: `ids()` returns `None` for the former and `Some(&[])` for the
//! latter. The loading flag is a third, separate signal owned by the load
//! tracker.

use ripple_core::{ActorId, ReportId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Context key naming one ordered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionKey {
    /// The main report feed.
    ReportFeed,
    /// Comments under one report.
    CommentsFor(ReportId),
    /// Badges awarded to one actor.
    BadgesFor(ActorId),
}

impl fmt::Display for ProjectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKey::ReportFeed => write!(f, "reports::feed"),
            ProjectionKey::CommentsFor(id) => write!(f, "comments::{}", id),
            ProjectionKey::BadgesFor(id) => write!(f, "badges::{}", id),
        }
    }
}

/// All materialized projections of one session.
#[derive(Debug, Default)]
pub struct ListProjections {
    lists: HashMap<ProjectionKey, Vec<Uuid>>,
}

impl ListProjections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the full sequence for a key, replacing whatever was there.
    /// Duplicates collapse to their first occurrence.
    pub fn materialize(&mut self, key: ProjectionKey, ids: Vec<Uuid>) {
        let mut seen = std::collections::HashSet::with_capacity(ids.len());
        let deduped: Vec<Uuid> = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        self.lists.insert(key, deduped);
    }

    /// `None` = never loaded; `Some(&[])` = loaded and empty.
    pub fn ids(&self, key: &ProjectionKey) -> Option<&[Uuid]> {
        self.lists.get(key).map(|v| v.as_slice())
    }

    pub fn is_materialized(&self, key: &ProjectionKey) -> bool {
        self.lists.contains_key(key)
    }

    pub fn contains(&self, key: &ProjectionKey, id: Uuid) -> bool {
        self.lists
            .get(key)
            .map(|ids| ids.contains(&id))
            .unwrap_or(false)
    }

    /// Append if absent. Returns false when the ID was already present or
    /// the key is not materialized (a view the session never loaded stays
    /// unmaterialized; empty is not the same as absent).
    pub fn insert(&mut self, key: ProjectionKey, id: Uuid) -> bool {
        match self.lists.get_mut(&key) {
            Some(ids) if !ids.contains(&id) => {
                ids.push(id);
                true
            }
            _ => false,
        }
    }

    /// Place at the head if absent. The caller re-sorts afterwards: slot 0
    /// is provisional, a pinned entry may outrank the new arrival.
    pub fn prepend(&mut self, key: ProjectionKey, id: Uuid) -> bool {
        match self.lists.get_mut(&key) {
            Some(ids) if !ids.contains(&id) => {
                ids.insert(0, id);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, key: &ProjectionKey, id: Uuid) -> bool {
        match self.lists.get_mut(key) {
            Some(ids) => {
                let before = ids.len();
                ids.retain(|existing| *existing != id);
                ids.len() != before
            }
            None => false,
        }
    }

    /// Drop the ID from every projection referencing it; returns the keys it
    /// was actually removed from (rollback re-inserts into exactly these).
    pub fn purge(&mut self, id: Uuid) -> Vec<ProjectionKey> {
        let mut purged = Vec::new();
        for (key, ids) in self.lists.iter_mut() {
            let before = ids.len();
            ids.retain(|existing| *existing != id);
            if ids.len() != before {
                purged.push(*key);
            }
        }
        purged
    }

    /// Stable re-sort of one projection with a comparator over IDs.
    pub fn resort(&mut self, key: &ProjectionKey, cmp: impl FnMut(&Uuid, &Uuid) -> Ordering) {
        if let Some(ids) = self.lists.get_mut(key) {
            ids.sort_by(cmp);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProjectionKey> {
        self.lists.keys()
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
