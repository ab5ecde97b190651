//! `RgaText`: a reference Text CRDT built on the same technique as a
//! Replicated Growable Array — every character keeps the identity of
//! the slot it was inserted into forever, deletions tombstone rather
//! than remove, and concurrent inserts at the same origin are ordered
//! by a descending `(replica, seq)` tie-break so all replicas that see
//! the same set of insertions converge on the same document order.
//!
//! This crate exists to give `revtext-core`'s tests something real to
//! exercise the Position Service contract against; it is not meant to
//! be a production rope. Nodes are one character each and document
//! order is a flat `Vec`, so every operation is O(n).

use crate::position::{Bias, Position, PositionService, ReplicaTag, Resolved, TextCrdt, TextEvent};
use revtext_common::SenderId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Node {
    pos: Position,
    author: SenderId,
    ch: char,
    deleted: bool,
    /// Document-order predecessor this node was inserted after, at the
    /// time of insertion. `None` means "start of document".
    origin: Option<Position>,
}

/// Reference Text CRDT. Construct with [`RgaText::new`] and drive it
/// with the same `replica` tag a given caller always uses — mixing
/// tags for what's conceptually one actor will make `wins` comparisons
/// meaningless but won't panic.
#[derive(Debug, Default)]
pub struct RgaText {
    nodes: Vec<Node>,
    next_seq: HashMap<SenderId, u64>,
}

/// Maps a `SenderId` to its `ReplicaTag` with an FNV-1a hash rather
/// than order of first contact, so every replica computes the same
/// tag for the same sender without a shared registry. Two distinct
/// senders colliding on the same 32-bit tag is the one correctness
/// gap this reference implementation accepts; see `DESIGN.md`.
fn replica_tag(replica: &SenderId) -> ReplicaTag {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in replica.as_str().as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

impl RgaText {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_seq: HashMap::new(),
        }
    }

    fn next_seq(&mut self, replica: &SenderId) -> u64 {
        let seq = self.next_seq.entry(replica.clone()).or_insert(0);
        let this = *seq;
        *seq += 1;
        this
    }

    /// Document-order slot index (into `self.nodes`, tombstones
    /// included) of the node at `pos`, if it's still present at all.
    fn node_index(&self, pos: Position) -> Option<usize> {
        self.nodes.iter().position(|n| n.pos == pos)
    }

    /// Slot index of the `visible_index`-th non-deleted node, or
    /// `self.nodes.len()` if `visible_index == self.length()`.
    fn slot_for_visible(&self, visible_index: usize) -> usize {
        let mut seen = 0;
        for (i, n) in self.nodes.iter().enumerate() {
            if n.deleted {
                continue;
            }
            if seen == visible_index {
                return i;
            }
            seen += 1;
        }
        self.nodes.len()
    }

    fn visible_count_before(&self, slot: usize) -> usize {
        self.nodes[..slot].iter().filter(|n| !n.deleted).count()
    }

    /// Whether sibling `candidate` (also parented at `origin`) must be
    /// placed before a fresh insertion from `new_replica`/`new_seq` at
    /// the same origin — the RGA concurrent-insert tie-break: higher
    /// `(replica, seq)` sorts first in document order.
    fn sibling_precedes(candidate: &Node, new_tag: ReplicaTag, new_seq: u64) -> bool {
        let cand_tag = replica_tag(&candidate.author);
        (cand_tag, candidate.pos.seq) >= (new_tag, new_seq)
    }

    fn insert_at_slot(&mut self, slot: usize, author: &SenderId, ch: char, origin: Option<Position>) -> Position {
        let tag = replica_tag(author);
        let seq = self.next_seq(author);
        let pos = Position { replica: tag, seq };

        // Walk forward past any existing siblings of the same origin
        // that must sort ahead of this new node.
        let mut insert_at = slot;
        while insert_at < self.nodes.len() {
            let candidate = &self.nodes[insert_at];
            if candidate.origin != origin {
                break;
            }
            if Self::sibling_precedes(candidate, tag, seq) {
                insert_at += 1;
            } else {
                break;
            }
        }

        self.nodes.insert(
            insert_at,
            Node {
                pos,
                author: author.clone(),
                ch,
                deleted: false,
                origin,
            },
        );
        pos
    }
}

impl PositionService for RgaText {
    fn position_of(&self, index: usize) -> Position {
        let slot = self.slot_for_visible(index);
        self.nodes
            .get(slot)
            .map(|n| n.pos)
            .unwrap_or(Position { replica: ReplicaTag::MAX, seq: u64::MAX })
    }

    fn index_of(&self, position: Position, bias: Bias) -> Resolved {
        let Some(slot) = self.node_index(position) else {
            return Resolved::NotFound;
        };
        if !self.nodes[slot].deleted {
            return Resolved::Index(self.visible_count_before(slot));
        }
        match bias {
            Bias::Exact => Resolved::NotFound,
            Bias::Left => {
                if let Some(i) = self.nodes[..slot].iter().rposition(|n| !n.deleted) {
                    Resolved::Index(self.visible_count_before(i + 1) - 1)
                } else {
                    Resolved::BeforeStart
                }
            }
            Bias::Right => {
                if self.nodes[slot + 1..].iter().any(|n| !n.deleted) {
                    Resolved::Index(self.visible_count_before(slot))
                } else {
                    Resolved::AfterEnd
                }
            }
        }
    }

    fn has(&self, position: Position) -> bool {
        self.node_index(position).is_some()
    }
}

impl TextCrdt for RgaText {
    fn length(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    fn char_at(&self, index: usize) -> char {
        self.nodes[self.slot_for_visible(index)].ch
    }

    fn to_string(&self) -> String {
        self.nodes.iter().filter(|n| !n.deleted).map(|n| n.ch).collect()
    }

    fn insert(&mut self, author: &SenderId, index: usize, text: &str) -> Vec<TextEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut slot = self.slot_for_visible(index);
        let mut origin = if index == 0 { None } else { Some(self.position_of(index - 1)) };
        let mut positions = Vec::with_capacity(text.chars().count());
        for ch in text.chars() {
            let pos = self.insert_at_slot(slot, author, ch, origin);
            slot = self.node_index(pos).unwrap() + 1;
            origin = Some(pos);
            positions.push(pos);
        }
        vec![TextEvent::Insert {
            index,
            values: text.to_string(),
            positions,
            author: author.clone(),
        }]
    }

    fn delete(&mut self, author: &SenderId, index: usize, count: usize) -> Vec<TextEvent> {
        if count == 0 {
            return Vec::new();
        }
        let mut values = String::with_capacity(count);
        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let slot = self.slot_for_visible(index);
            if slot >= self.nodes.len() {
                break;
            }
            let node = &mut self.nodes[slot];
            node.deleted = true;
            values.push(node.ch);
            positions.push(node.pos);
        }
        if positions.is_empty() {
            return Vec::new();
        }
        vec![TextEvent::Delete {
            index,
            values,
            positions,
            author: author.clone(),
        }]
    }

    fn delete_range(&mut self, author: &SenderId, start: Position, end_inclusive: Position) -> Vec<TextEvent> {
        let Some(start_slot) = self.node_index(start) else {
            return Vec::new();
        };
        let Some(end_slot) = self.node_index(end_inclusive) else {
            return Vec::new();
        };
        if end_slot < start_slot {
            return Vec::new();
        }
        let index = self.visible_count_before(start_slot);
        let mut values = String::new();
        let mut positions = Vec::new();
        for slot in start_slot..=end_slot {
            let node = &mut self.nodes[slot];
            if node.deleted {
                continue;
            }
            node.deleted = true;
            values.push(node.ch);
            positions.push(node.pos);
        }
        if positions.is_empty() {
            return Vec::new();
        }
        vec![TextEvent::Delete {
            index,
            values,
            positions,
            author: author.clone(),
        }]
    }

    fn undelete_range(&mut self, author: &SenderId, start: Position, end_inclusive: Position) -> Vec<TextEvent> {
        let Some(start_slot) = self.node_index(start) else {
            return Vec::new();
        };
        let Some(end_slot) = self.node_index(end_inclusive) else {
            return Vec::new();
        };
        if end_slot < start_slot {
            return Vec::new();
        }
        let mut values = String::new();
        let mut positions = Vec::new();
        for slot in start_slot..=end_slot {
            let node = &mut self.nodes[slot];
            if !node.deleted {
                continue;
            }
            node.deleted = false;
            values.push(node.ch);
            positions.push(node.pos);
        }
        if positions.is_empty() {
            return Vec::new();
        }
        let index = self.visible_count_before(start_slot);
        vec![TextEvent::Insert {
            index,
            values,
            positions,
            author: author.clone(),
        }]
    }

    fn first_position(&self) -> Option<Position> {
        self.nodes.first().map(|n| n.pos)
    }

    fn last_position(&self) -> Option<Position> {
        self.nodes.last().map(|n| n.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(s: &str) -> SenderId {
        SenderId::from(s)
    }

    #[test]
    fn sequential_inserts_build_the_expected_string() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "hello");
        text.insert(&sender("a"), 5, " world");
        assert_eq!(TextCrdt::to_string(&text), "hello world");
        assert_eq!(text.length(), 11);
    }

    #[test]
    fn delete_tombstones_rather_than_removing() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "hello");
        let pos = text.position_of(1); // 'e'
        text.delete(&sender("a"), 1, 1);
        assert_eq!(TextCrdt::to_string(&text), "hllo");
        assert!(text.has(pos));
        assert_eq!(text.index_of(pos, Bias::Exact), Resolved::NotFound);
        assert_eq!(text.index_of(pos, Bias::Left), Resolved::Index(0));
        assert_eq!(text.index_of(pos, Bias::Right), Resolved::Index(1));
    }

    #[test]
    fn concurrent_inserts_at_same_origin_order_by_replica_seq_descending() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "x");
        let origin = text.position_of(0);

        // Two replicas both insert immediately after `origin` without
        // having seen each other's operation. Document order must put
        // the higher-tagged/higher-seq one first, deterministically
        // regardless of application order.
        let mut text2 = RgaText::new();
        text2.insert(&sender("a"), 0, "x");
        assert_eq!(text.position_of(0), text2.position_of(0));

        text.insert(&sender("b"), 1, "1");
        text.insert(&sender("c"), 1, "2");

        text2.insert(&sender("c"), 1, "2");
        text2.insert(&sender("b"), 1, "1");

        assert_eq!(TextCrdt::to_string(&text), TextCrdt::to_string(&text2));
        let _ = origin;
    }

    #[test]
    fn position_survives_deletion_for_left_bias_lookups() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "abc");
        let b = text.position_of(1);
        text.delete(&sender("a"), 1, 1);
        assert!(text.has(b));
        assert!(!text.node_index(b).is_none());
    }

    #[test]
    fn delete_range_removes_a_contiguous_position_span() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "abcdef");
        let start = text.position_of(1);
        let end = text.position_of(3);
        text.delete_range(&sender("a"), start, end);
        assert_eq!(TextCrdt::to_string(&text), "aef");
    }

    #[test]
    fn undelete_range_reverses_a_prior_delete_range() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "abcdef");
        let start = text.position_of(1);
        let end = text.position_of(3);
        text.delete_range(&sender("a"), start, end);
        assert_eq!(TextCrdt::to_string(&text), "aef");
        text.undelete_range(&sender("a"), start, end);
        assert_eq!(TextCrdt::to_string(&text), "abcdef");
    }

    #[test]
    fn first_and_last_position_span_the_whole_document() {
        let mut text = RgaText::new();
        text.insert(&sender("a"), 0, "abc");
        assert_eq!(text.first_position(), Some(text.position_of(0)));
        assert_eq!(text.last_position(), Some(text.position_of(2)));
    }
}
