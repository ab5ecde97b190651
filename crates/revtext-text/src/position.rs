//! The Position Service and Text CRDT contracts consumed by the engine.
//!
//! Both are external collaborators — a production replica may swap in
//! any implementation that upholds these contracts (a real rope/B-tree
//! CRDT, a server-backed one, whatever). `rga::RgaText` is the
//! reference implementation used by this crate's own tests and by
//! `revtext-core`'s integration tests.

use revtext_common::SenderId;
use std::fmt;

/// Opaque, totally ordered, immutable identifier for one character
/// slot. Two positions from the same text CRDT instance (or any of its
/// replicas, once converged) compare consistently regardless of
/// whether the underlying character is still present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Position {
    /// The replica that inserted this character.
    pub replica: ReplicaTag,
    /// That replica's per-replica sequence number for this character.
    pub seq: u64,
}

/// Lightweight, `Copy`-able stand-in for `SenderId` so `Position` can
/// derive `Copy`. Interned by value; cheap to compare and hash.
pub type ReplicaTag = u32;

/// How to resolve a `Position` that may have been tombstoned back to a
/// currently-visible index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Nearest present position at or before this one.
    Left,
    /// Nearest present position at or after this one.
    Right,
    /// Only the exact position; not-present is a miss.
    Exact,
}

/// Result of an `index_of` lookup. `NotFound` distinguishes the
/// `Exact`-bias miss from the `Left`/`Right` sentinels (`-1` for "none
/// to the left", `length` for "none to the right") without overloading
/// `isize` sentinels in the trait itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Index(usize),
    /// `Left` bias with nothing present at or before the position.
    BeforeStart,
    /// `Right` bias with nothing present at or after the position.
    AfterEnd,
    /// `Exact` bias and the position is not currently present.
    NotFound,
}

impl Resolved {
    /// Clamp to a usable index for range math, per the
    /// "-1 / length" sentinel convention above.
    pub fn as_index_or(&self, len: usize) -> isize {
        match self {
            Resolved::Index(i) => *i as isize,
            Resolved::BeforeStart | Resolved::NotFound => -1,
            Resolved::AfterEnd => len as isize,
        }
    }
}

/// A single visible-content mutation, as broadcast to subscribers of
/// the text CRDT's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TextEvent {
    Insert {
        index: usize,
        values: String,
        positions: Vec<Position>,
        author: SenderId,
    },
    Delete {
        index: usize,
        values: String,
        positions: Vec<Position>,
        author: SenderId,
    },
}

/// Position-identity half of the external contract: presence tests and
/// index<->position conversion. Split from `TextCrdt` because some
/// hosts (e.g. a server relaying text it never renders) only need this
/// half.
pub trait PositionService {
    fn position_of(&self, index: usize) -> Position;
    fn index_of(&self, position: Position, bias: Bias) -> Resolved;
    fn has(&self, position: Position) -> bool;
}

/// The ordered-sequence half of the external contract.
pub trait TextCrdt: PositionService {
    fn length(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.length() == 0
    }
    fn char_at(&self, index: usize) -> char;
    fn to_string(&self) -> String;

    /// Insert `text` at `index`, attributed to `author`. Returns the
    /// events to broadcast (always exactly one `Insert`, for the
    /// reference implementation, but hosts backed by a richer CRDT may
    /// split a single call into several spans).
    fn insert(&mut self, author: &SenderId, index: usize, text: &str) -> Vec<TextEvent>;

    fn delete(&mut self, author: &SenderId, index: usize, count: usize) -> Vec<TextEvent>;

    /// Delete by position range rather than by index — used by the
    /// engine when acting on annotations, whose endpoints are
    /// positions that may have drifted relative to the caller's view
    /// of the document.
    fn delete_range(&mut self, author: &SenderId, start: Position, end_inclusive: Position) -> Vec<TextEvent>;

    /// Restore a previously deleted position range to visible, the
    /// inverse of `delete_range`. Used when a later-delivered Removal
    /// record reverses an earlier one's delete side effect, so the
    /// result stays arrival-order-independent across replicas.
    fn undelete_range(&mut self, author: &SenderId, start: Position, end_inclusive: Position) -> Vec<TextEvent>;

    /// Position of the first node ever inserted, tombstoned or not.
    /// Lets the engine resolve an open start endpoint (`None`) to a
    /// concrete position when it needs to act on a range rather than
    /// an index.
    fn first_position(&self) -> Option<Position>;

    /// Position of the last node ever inserted, tombstoned or not —
    /// see `first_position`.
    fn last_position(&self) -> Option<Position>;
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.seq, self.replica)
    }
}
