//! The `wins` tie-break rule and the total order it induces over a
//! record history.

use crate::record::AnnotationRecord;
use std::cmp::Ordering;

/// `wins(a, b)`: `a.lamport > b.lamport`, or equal lamports with
/// `a.sender_id >= b.sender_id`. Reflexive on exact ties by design —
/// those only occur within one transaction, where delivery order (not
/// this relation) decides which is newer.
pub fn wins(a: &AnnotationRecord, b: &AnnotationRecord) -> bool {
    a.lamport > b.lamport || (a.lamport == b.lamport && a.sender_id >= b.sender_id)
}

/// Ascending comparator matching `wins`: sorting a slice with this and
/// taking the last element yields the record that wins over all
/// others with a strictly smaller key. Equal keys are left in place by
/// a stable sort, which is what recovers "later delivery wins" for the
/// reflexive tie case.
pub fn cmp_wins(a: &AnnotationRecord, b: &AnnotationRecord) -> Ordering {
    (a.lamport, &a.sender_id).cmp(&(b.lamport, &b.sender_id))
}

/// Sort `records` ascending by `wins` order, preserving relative order
/// of exact `(lamport, sender_id)` ties (a stable sort already does
/// this, but the name documents the intent at call sites).
pub fn sort_ascending(records: &mut [&AnnotationRecord]) {
    records.sort_by(|a, b| cmp_wins(a, b));
}
