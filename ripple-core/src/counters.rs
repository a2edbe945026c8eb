//! Counter vocabulary
//!
//! Denormalized aggregate fields and the deltas that move them. A delta and
//! its inverse must cancel exactly, which is what makes optimistic rollback
//! conserve counts; nothing here clamps or saturates.

use crate::ids::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The aggregate fields the engine maintains.
///
/// `Comments` and `Upvotes` live on reports, `Likes` on comments. The
/// propagator rejects mismatched kind/field pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterField {
    Comments,
    Upvotes,
    Likes,
}

impl CounterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterField::Comments => "comments",
            CounterField::Upvotes => "upvotes",
            CounterField::Likes => "likes",
        }
    }

    /// The entity kind that carries this field.
    pub fn carrier(&self) -> EntityKind {
        match self {
            CounterField::Comments | CounterField::Upvotes => EntityKind::Report,
            CounterField::Likes => EntityKind::Comment,
        }
    }
}

impl fmt::Display for CounterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One additive adjustment to a counter on a cached entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub kind: EntityKind,
    pub id: Uuid,
    pub field: CounterField,
    pub amount: i32,
}

impl CounterDelta {
    pub fn new(kind: EntityKind, id: Uuid, field: CounterField, amount: i32) -> Self {
        Self {
            kind,
            id,
            field,
            amount,
        }
    }

    /// The delta that exactly undoes this one.
    pub fn inverted(&self) -> Self {
        Self {
            amount: -self.amount,
            ..*self
        }
    }
}

impl fmt::Display for CounterDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} on {} {}",
            if self.amount >= 0 { "+" } else { "" },
            self.amount,
            self.field,
            self.kind,
            self.id
        )
    }
}
