//! The Annotation Log: append-only, replicated storage of
//! [`AnnotationRecord`]s with causal-order delivery and a subscriber
//! bus for external observers. It holds its own logical clock and
//! notifies subscribers through a stored callback (`send_cb`) rather
//! than a generic event-bus crate.

use crate::order::cmp_wins;
use crate::record::{AnnotationRecord, PartialRecord};
use revtext_common::{AnnotationId, Lamport, SenderId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Append-only record store plus the local Lamport clock used to stamp
/// this replica's own appends.
pub struct AnnotationLog {
    sender_id: SenderId,
    clock: Lamport,
    records: Vec<AnnotationRecord>,
    subscribers: Vec<Arc<dyn Fn(&AnnotationRecord) + Send + Sync>>,
}

impl AnnotationLog {
    pub fn new(sender_id: SenderId) -> Self {
        Self {
            sender_id,
            clock: Lamport::ZERO,
            records: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Stamp a locally originated operation with this replica's next
    /// Lamport tick and its own `sender_id`. Does not store the record
    /// — the caller (the engine) processes it against the log's
    /// current history first, then commits it with [`Self::commit`].
    pub fn stamp_local(&mut self, partial: PartialRecord) -> AnnotationRecord {
        self.clock = self.clock.next();
        AnnotationRecord {
            id: partial.id,
            user_id: partial.user_id,
            lamport: self.clock,
            sender_id: self.sender_id.clone(),
            timestamp: partial.timestamp,
            body: partial.body,
        }
    }

    /// Fold a remote record's Lamport timestamp into this replica's
    /// clock (the standard Lamport-clock receive rule), before it is
    /// processed and committed.
    pub fn observe_remote_lamport(&mut self, lamport: Lamport) {
        if lamport > self.clock {
            self.clock = lamport;
        }
    }

    /// All records delivered so far for `id`'s history, ascending by
    /// `wins` order. Does not include a record until [`Self::commit`]
    /// has been called for it.
    pub fn history(&self, id: AnnotationId) -> Vec<&AnnotationRecord> {
        let mut matching: Vec<&AnnotationRecord> = self.records.iter().filter(|r| r.annotation_id() == id).collect();
        matching.sort_by(|a, b| cmp_wins(a, b));
        matching
    }

    /// Store `record` and notify subscribers. Called by the engine
    /// after it has computed the record's effect against the prior
    /// history, so subscribers always observe records in the same
    /// order the engine processed them.
    pub fn commit(&mut self, record: AnnotationRecord) {
        debug!(id = %record.annotation_id(), lamport = record.lamport.0, sender = %record.sender_id, "commit annotation record");
        self.records.push(record.clone());
        for sub in &self.subscribers {
            sub(&record);
        }
    }

    /// Register an external observer (persistence, a demo UI feed)
    /// that wants every committed record, in commit order. The engine
    /// does not use this path for its own processing — see
    /// `DESIGN.md` for why.
    pub fn subscribe(&mut self, f: impl Fn(&AnnotationRecord) + Send + Sync + 'static) {
        self.subscribers.push(Arc::new(f));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recently committed record, if any — the one a caller
    /// just appended locally and now wants to hand to a transport.
    pub fn last(&self) -> Option<&AnnotationRecord> {
        self.records.last()
    }

    /// Serialize the log as parallel arrays grouped by annotation id.
    pub fn snapshot(&self) -> Snapshot {
        use std::collections::BTreeMap;
        let mut grouped: BTreeMap<AnnotationId, Vec<AnnotationRecord>> = BTreeMap::new();
        for record in &self.records {
            grouped.entry(record.annotation_id()).or_default().push(record.clone());
        }
        let mut change_ids = Vec::with_capacity(grouped.len());
        let mut lengths = Vec::with_capacity(grouped.len());
        let mut records = Vec::with_capacity(self.records.len());
        for (id, mut group) in grouped {
            group.sort_by(cmp_wins);
            change_ids.push(id);
            lengths.push(group.len());
            records.extend(group);
        }
        Snapshot { change_ids, lengths, records }
    }

    /// Merge a snapshot into this log. Idempotent: a record is only
    /// applied if no record already held for its annotation id has a
    /// `lamport` greater than or equal to it.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        let mut offset = 0;
        for (idx, &len) in snapshot.lengths.iter().enumerate() {
            let id = snapshot.change_ids[idx];
            let group = &snapshot.records[offset..offset + len];
            offset += len;
            let highest_held = self
                .records
                .iter()
                .filter(|r| r.annotation_id() == id)
                .map(|r| r.lamport)
                .max();
            for record in group {
                if let Some(highest) = highest_held {
                    if record.lamport <= highest {
                        continue;
                    }
                }
                if record.lamport > self.clock {
                    self.clock = record.lamport;
                }
                self.records.push(record.clone());
            }
        }
    }
}

/// Parallel-array snapshot of an [`AnnotationLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub change_ids: Vec<AnnotationId>,
    pub lengths: Vec<usize>,
    pub records: Vec<AnnotationRecord>,
}

impl Snapshot {
    pub fn decode_all(bytes: &[&[u8]]) -> Result<Vec<AnnotationRecord>, crate::error::EngineError> {
        bytes.iter().map(|b| crate::wire::decode_record(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Endpoint, RecordBody};
    use revtext_common::UserId;

    fn insert_suggestion(id: AnnotationId, user: &str) -> PartialRecord {
        PartialRecord {
            id,
            user_id: UserId::from(user),
            timestamp: 0,
            body: RecordBody::InsertSuggestion {
                start: Endpoint::open(None),
                end: Endpoint::open(None),
            },
        }
    }

    #[test]
    fn history_is_empty_until_commit() {
        let mut log = AnnotationLog::new(SenderId::from("r1"));
        let id = AnnotationId::new();
        let record = log.stamp_local(insert_suggestion(id, "alice"));
        assert!(log.history(id).is_empty());
        log.commit(record);
        assert_eq!(log.history(id).len(), 1);
    }

    #[test]
    fn subscribers_see_committed_records_in_order() {
        let mut log = AnnotationLog::new(SenderId::from("r1"));
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        log.subscribe(move |r| seen2.lock().unwrap().push(r.lamport.0));
        for _ in 0..3 {
            let r = log.stamp_local(insert_suggestion(AnnotationId::new(), "alice"));
            log.commit(r);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn snapshot_roundtrip_groups_by_annotation_id() {
        let mut log = AnnotationLog::new(SenderId::from("r1"));
        let id = AnnotationId::new();
        let r1 = log.stamp_local(insert_suggestion(id, "alice"));
        log.commit(r1);
        let removal = log.stamp_local(PartialRecord {
            id: AnnotationId::new(),
            user_id: UserId::from("alice"),
            timestamp: 0,
            body: RecordBody::AcceptSuggestion { dependent_on: id },
        });
        log.commit(removal);

        let snapshot = log.snapshot();
        let mut reloaded = AnnotationLog::new(SenderId::from("r2"));
        reloaded.load_snapshot(&snapshot);
        assert_eq!(reloaded.history(id).len(), 2);
    }

    #[test]
    fn loading_the_same_snapshot_twice_is_idempotent() {
        let mut log = AnnotationLog::new(SenderId::from("r1"));
        let id = AnnotationId::new();
        let r1 = log.stamp_local(insert_suggestion(id, "alice"));
        log.commit(r1);
        let snapshot = log.snapshot();

        let mut reloaded = AnnotationLog::new(SenderId::from("r2"));
        reloaded.load_snapshot(&snapshot);
        reloaded.load_snapshot(&snapshot);
        assert_eq!(reloaded.history(id).len(), 1);
    }
}
