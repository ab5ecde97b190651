//! The Track-Changes Engine: turns delivered annotation records into
//! the derived, position-indexed view and the public
//! `insert`/`delete`/`acceptSuggestion`/`declineSuggestion`/
//! `addComment`/`removeComment` operations, following up with Text
//! CRDT mutations where processing and direct edits call for them.

use crate::error::{EngineError, Result};
use crate::log::AnnotationLog;
use crate::order::{cmp_wins, wins};
use crate::record::{fold, Action, AnnotationKind, AnnotationRecord, Endpoint, PartialRecord, RecordBody};
use revtext_common::{AnnotationId, Config, SenderId, UserId};
use revtext_text::position::{Bias, Position, PositionService, Resolved, TextCrdt, TextEvent};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

pub use crate::record::EffectiveAnnotation;

/// Why an annotation left the derived view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Accepted,
    Declined,
    Replaced,
    Removed,
}

/// A high-level event the editor binding reacts to. A bare
/// format-only change kind isn't produced by this engine — see
/// `DESIGN.md`.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Insert { index: usize, values: String, positions: Vec<Position> },
    Delete { index: usize, values: String, positions: Vec<Position> },
    AnnotationAdded { start_index: usize, end_index: usize, annotation: EffectiveAnnotation },
    AnnotationRemoved { start_index: usize, end_index: usize, annotation: EffectiveAnnotation, reason: RemovalReason, author: UserId },
}

impl Event {
    fn from_text_event(event: TextEvent) -> Self {
        match event {
            TextEvent::Insert { index, values, positions, .. } => Event::Insert { index, values, positions },
            TextEvent::Delete { index, values, positions, .. } => Event::Delete { index, values, positions },
        }
    }
}

#[derive(Debug, Clone)]
struct DataPointEntry {
    annotation: EffectiveAnnotation,
    starting_here: bool,
    ending_here: bool,
}

#[derive(Debug, Clone)]
struct DataPoint {
    position: Position,
    buckets: HashMap<AnnotationKind, Vec<DataPointEntry>>,
}

enum ExtendSide {
    Left,
    Right,
}

/// Whether a removal record's effect on `kind` is to delete text:
/// accepting a DeleteSuggestion, or declining an InsertSuggestion.
/// Every other removal (declining a DeleteSuggestion, accepting an
/// InsertSuggestion, removing a Comment) leaves the text untouched.
fn removal_deletes(kind: AnnotationKind, removal: &AnnotationRecord) -> bool {
    matches!(
        (kind, &removal.body),
        (AnnotationKind::DeleteSuggestion, RecordBody::AcceptSuggestion { .. }) | (AnnotationKind::InsertSuggestion, RecordBody::DeclineSuggestion { .. })
    )
}

/// Consumes annotation-log events and maintains the position-indexed
/// derived view on top of a caller-supplied Text CRDT.
pub struct TrackChangesEngine<T: TextCrdt> {
    user_id: UserId,
    sender_id: SenderId,
    log: AnnotationLog,
    text: T,
    data_points: Vec<DataPoint>,
}

impl<T: TextCrdt> TrackChangesEngine<T> {
    pub fn new(config: Config, sender_id: SenderId, text: T) -> Self {
        Self {
            user_id: config.user_id,
            sender_id: sender_id.clone(),
            log: AnnotationLog::new(sender_id),
            text,
            data_points: Vec::new(),
        }
    }

    pub fn text(&self) -> &T {
        &self.text
    }

    pub fn to_string(&self) -> String {
        TextCrdt::to_string(&self.text)
    }

    pub fn sender_id(&self) -> &SenderId {
        &self.sender_id
    }

    /// The record a just-completed local operation appended, if any
    /// (`insert`/`delete` with `is_suggestion: false` append nothing).
    /// For a caller to hand to a transport and other replicas.
    pub fn last_record(&self) -> Option<AnnotationRecord> {
        self.log.last().cloned()
    }

    fn now(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    fn resolve_left(&self, pos: Position) -> usize {
        match self.text.index_of(pos, Bias::Left) {
            Resolved::Index(i) => i,
            Resolved::BeforeStart | Resolved::NotFound => 0,
            Resolved::AfterEnd => self.text.length(),
        }
    }

    /// Resolved index of an end endpoint, made exclusive — the
    /// derived view always treats `endIndex` as exclusive.
    fn resolve_right_exclusive(&self, pos: Position) -> usize {
        match self.text.index_of(pos, Bias::Right) {
            Resolved::Index(i) => i + 1,
            Resolved::AfterEnd => self.text.length(),
            Resolved::BeforeStart | Resolved::NotFound => self.text.length(),
        }
    }

    fn sort_key(&self, pos: Position) -> (isize, u32, u64) {
        (self.resolve_left(pos) as isize, pos.replica, pos.seq)
    }

    /// Resolve both ends of an annotation to concrete positions usable
    /// with `delete_range`/`undelete_range`, treating an open start as
    /// the document's first position and an open end as its last —
    /// rather than requiring concrete positions on both ends, which a
    /// suggestion created at a document boundary never has. `None` if
    /// the document has no content to resolve an open end against.
    fn resolve_endpoint_positions(&self, a: &EffectiveAnnotation) -> Option<(Position, Position)> {
        let start = a.start.pos.or_else(|| self.text.first_position())?;
        let end = a.end.pos.or_else(|| self.text.last_position())?;
        Some((start, end))
    }

    fn find_data_point(&self, pos: Position) -> Option<usize> {
        self.data_points.iter().position(|dp| dp.position == pos)
    }

    fn nearest_at_or_before(&self, pos: Position) -> Option<usize> {
        let key = self.sort_key(pos);
        let p = self.data_points.partition_point(|dp| self.sort_key(dp.position) < key);
        if p < self.data_points.len() && self.sort_key(self.data_points[p].position) == key {
            Some(p)
        } else if p == 0 {
            None
        } else {
            Some(p - 1)
        }
    }

    /// Create a data point at `pos` if one doesn't already exist,
    /// seeding it by copying forward every still-crossing entry from
    /// the nearest data point to its left.
    fn ensure_data_point(&mut self, pos: Position) -> usize {
        if let Some(i) = self.find_data_point(pos) {
            return i;
        }
        let key = self.sort_key(pos);
        let insert_at = self.data_points.partition_point(|dp| self.sort_key(dp.position) < key);
        let mut buckets: HashMap<AnnotationKind, Vec<DataPointEntry>> = HashMap::new();
        if insert_at > 0 {
            let left = &self.data_points[insert_at - 1];
            for (kind, entries) in &left.buckets {
                let carried: Vec<DataPointEntry> = entries
                    .iter()
                    .filter(|e| !e.ending_here)
                    .map(|e| DataPointEntry { annotation: e.annotation.clone(), starting_here: false, ending_here: false })
                    .collect();
                if !carried.is_empty() {
                    buckets.insert(*kind, carried);
                }
            }
        }
        self.data_points.insert(insert_at, DataPoint { position: pos, buckets });
        insert_at
    }

    fn add_annotation(&mut self, a: EffectiveAnnotation) -> Vec<Event> {
        let start_pos = a.start.pos.unwrap_or_else(|| self.text.position_of(0));
        let start_idx = self.ensure_data_point(start_pos);
        let end_idx = match a.end.pos {
            Some(p) => self.ensure_data_point(p),
            None => {
                if self.data_points.is_empty() {
                    start_idx
                } else {
                    self.data_points.len() - 1
                }
            }
        };
        let (lo, hi) = if start_idx <= end_idx { (start_idx, end_idx) } else { (end_idx, start_idx) };
        for i in lo..=hi {
            let entry = DataPointEntry { annotation: a.clone(), starting_here: i == lo, ending_here: i == hi };
            let bucket = self.data_points[i].buckets.entry(a.kind).or_default();
            bucket.retain(|e| e.annotation.id != a.id);
            bucket.push(entry);
        }
        let start_index = self.resolve_left(start_pos);
        let end_index = match a.end.pos {
            Some(p) => self.resolve_right_exclusive(p),
            None => self.text.length(),
        };
        vec![Event::AnnotationAdded { start_index, end_index, annotation: a }]
    }

    fn remove_annotation(&mut self, a: EffectiveAnnotation, reason: RemovalReason, author: UserId) -> Vec<Event> {
        let start_pos = a.start.pos.unwrap_or_else(|| self.text.position_of(0));
        let start_idx = self.find_data_point(start_pos);
        let end_idx = match a.end.pos {
            Some(p) => self.find_data_point(p),
            None => {
                if self.data_points.is_empty() {
                    None
                } else {
                    Some(self.data_points.len() - 1)
                }
            }
        };
        if let (Some(lo0), Some(hi0)) = (start_idx, end_idx) {
            let (lo, hi) = if lo0 <= hi0 { (lo0, hi0) } else { (hi0, lo0) };
            for dp in &mut self.data_points[lo..=hi] {
                for bucket in dp.buckets.values_mut() {
                    bucket.retain(|e| e.annotation.id != a.id);
                }
                dp.buckets.retain(|_, v| !v.is_empty());
            }
        }
        let start_index = self.resolve_left(start_pos);
        let end_index = match a.end.pos {
            Some(p) => self.resolve_right_exclusive(p),
            None => self.text.length(),
        };
        vec![Event::AnnotationRemoved { start_index, end_index, annotation: a, reason, author }]
    }

    /// The live annotations crossing
    /// `position`, honoring closed/open endpoint visibility.
    pub fn annotations_at(&self, position: Position) -> Vec<EffectiveAnnotation> {
        let Some(idx) = self.nearest_at_or_before(position) else {
            return Vec::new();
        };
        let dp = &self.data_points[idx];
        let mut out = Vec::new();
        for entries in dp.buckets.values() {
            for e in entries {
                if e.ending_here && !e.annotation.end.closed {
                    continue;
                }
                if e.starting_here && !e.annotation.start.closed {
                    continue;
                }
                out.push(e.annotation.clone());
            }
        }
        out
    }

    /// One entry per live
    /// annotation id, deduplicated across data points.
    pub fn active_annotations(&self) -> Vec<EffectiveAnnotation> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for dp in &self.data_points {
            for entries in dp.buckets.values() {
                for e in entries {
                    if seen.insert(e.annotation.id) {
                        out.push(e.annotation.clone());
                    }
                }
            }
        }
        out
    }

    /// Process a record already stamped with `(lamport, sender_id)`
    /// against the log's history so far, following §4.2.1's dispatch,
    /// then commit it. Shared by local operations and
    /// [`Self::receive_remote`].
    fn process_and_commit(&mut self, record: AnnotationRecord) -> Vec<Event> {
        let events = self.process(&record);
        self.log.commit(record);
        events
    }

    fn process(&mut self, record: &AnnotationRecord) -> Vec<Event> {
        let aid = record.annotation_id();
        let history: Vec<AnnotationRecord> = self.log.history(aid).into_iter().cloned().collect();

        match &record.body {
            RecordBody::InsertSuggestion { .. } | RecordBody::DeleteSuggestion { .. } | RecordBody::AddComment { .. } => {
                if let Some(removal) = history.iter().rev().find(|r| r.body.is_removal()) {
                    if wins(removal, record) {
                        return Vec::new();
                    }
                }
                let updates = history.iter().filter(|r| matches!(r.body, RecordBody::RangeUpdate { .. }));
                let effective = fold(record, updates);
                self.add_annotation(effective)
            }
            RecordBody::RangeUpdate { dependent_on, .. } => {
                let Some(addition) = history.iter().find(|r| r.id == *dependent_on && r.body.action() == Action::Addition) else {
                    warn!(id = %dependent_on, "RangeUpdate with no matching Addition, dropping");
                    return Vec::new();
                };
                if let Some(removal) = history.iter().rev().find(|r| r.body.is_removal()) {
                    if wins(removal, record) {
                        return Vec::new();
                    }
                }
                let mut updates_excluding: Vec<AnnotationRecord> = history
                    .iter()
                    .filter(|r| matches!(r.body, RecordBody::RangeUpdate { .. }))
                    .cloned()
                    .collect();
                updates_excluding.sort_by(cmp_wins);
                let a_old = fold(addition, updates_excluding.iter());

                let mut updates_including = updates_excluding.clone();
                updates_including.push(record.clone());
                updates_including.sort_by(cmp_wins);
                let a_new = fold(addition, updates_including.iter());

                let author = addition.user_id.clone();
                let mut events = self.remove_annotation(a_old, RemovalReason::Replaced, author);
                events.extend(self.add_annotation(a_new));
                events
            }
            RecordBody::AcceptSuggestion { dependent_on }
            | RecordBody::DeclineSuggestion { dependent_on }
            | RecordBody::RemoveComment { dependent_on } => {
                let dependent_on = *dependent_on;
                let Some(addition) = history.iter().find(|r| r.id == dependent_on && r.body.action() == Action::Addition) else {
                    warn!(id = %dependent_on, "Removal with no matching Addition, dropping");
                    return Vec::new();
                };

                // The removal already held for this id, if any, and
                // whether the incoming one dominates it under `wins`.
                // Only the existing removal's continued presence (not
                // merely its existence) should drop the incoming one —
                // see `DESIGN.md`.
                let existing_removal = history.iter().filter(|r| r.body.is_removal()).max_by(|a, b| cmp_wins(a, b)).cloned();
                if let Some(existing) = &existing_removal {
                    if wins(existing, record) {
                        return Vec::new();
                    }
                }

                let mut updates: Vec<AnnotationRecord> =
                    history.iter().filter(|r| matches!(&r.body, RecordBody::RangeUpdate { dependent_on: d, .. } if *d == dependent_on)).cloned().collect();
                updates.sort_by(cmp_wins);
                let effective = fold(addition, updates.iter());

                let reason = match &record.body {
                    RecordBody::AcceptSuggestion { .. } => RemovalReason::Accepted,
                    RecordBody::DeclineSuggestion { .. } => RemovalReason::Declined,
                    RecordBody::RemoveComment { .. } => RemovalReason::Removed,
                    _ => unreachable!(),
                };
                let author = record.user_id.clone();
                let mut events = self.remove_annotation(effective.clone(), reason, author);

                let was_deleting = existing_removal.as_ref().is_some_and(|r| removal_deletes(effective.kind, r));
                let should_delete = removal_deletes(effective.kind, record);
                if should_delete && !was_deleting {
                    if let Some((start, end)) = self.resolve_endpoint_positions(&effective) {
                        let text_events = self.text.delete_range(&self.sender_id, start, end);
                        events.extend(text_events.into_iter().map(Event::from_text_event));
                    }
                } else if was_deleting && !should_delete {
                    if let Some((start, end)) = self.resolve_endpoint_positions(&effective) {
                        let text_events = self.text.undelete_range(&self.sender_id, start, end);
                        events.extend(text_events.into_iter().map(Event::from_text_event));
                    }
                }
                events
            }
        }
    }

    /// Deliver a remote record: fold its Lamport into this replica's
    /// clock, then process and commit it exactly as a local append.
    pub fn receive_remote(&mut self, record: AnnotationRecord) -> Vec<Event> {
        self.log.observe_remote_lamport(record.lamport);
        self.process_and_commit(record)
    }

    /// Replicate a character insertion that already happened on
    /// another replica's Text CRDT. Character replication is the Text
    /// CRDT's own concern, not the annotation log's — a production
    /// host carries it over whatever channel that CRDT defines; this
    /// is the narrow hook reference tests use to drive `RgaText` to
    /// the same converged content across replicas.
    pub fn apply_remote_insert(&mut self, author: &SenderId, index: usize, text: &str) -> Vec<Event> {
        self.text.insert(author, index, text).into_iter().map(Event::from_text_event).collect()
    }

    /// Replicate a character deletion that already happened on
    /// another replica's Text CRDT, by index — see
    /// [`Self::apply_remote_insert`].
    pub fn apply_remote_delete(&mut self, author: &SenderId, index: usize, count: usize) -> Vec<Event> {
        self.text.delete(author, index, count).into_iter().map(Event::from_text_event).collect()
    }

    /// An own live InsertSuggestion whose right edge sits exactly at
    /// `index` before this insertion, whether that edge is a concrete
    /// position or the open end of the document — `at_tail` tells
    /// which case applies, since an open end's identity isn't a
    /// `Position` to probe for.
    fn find_adjacent_insert_suggestion(&self, index: usize, at_tail: bool) -> Option<AnnotationId> {
        let probe = if index == 0 { None } else { Some(self.text.position_of(index - 1)) };
        self.active_annotations().into_iter().find_map(|a| {
            if a.kind != AnnotationKind::InsertSuggestion || a.user_id != self.user_id {
                return None;
            }
            let adjacent = match a.end.pos {
                Some(_) => probe.is_some() && a.end.pos == probe,
                None => at_tail,
            };
            adjacent.then_some(a.id)
        })
    }

    fn find_enclosing_own_insert_suggestion(&self, index: usize, count: usize) -> bool {
        self.active_annotations().into_iter().any(|a| {
            if a.kind != AnnotationKind::InsertSuggestion || a.user_id != self.user_id {
                return false;
            }
            let s = a.start.pos.map(|p| self.resolve_left(p)).unwrap_or(0);
            let e = a.end.pos.map(|p| self.resolve_right_exclusive(p)).unwrap_or_else(|| self.text.length());
            s <= index && index + count <= e
        })
    }

    fn find_adjacent_delete_suggestion(&self, start_probe: Option<Position>, end_probe: Option<Position>) -> Option<(AnnotationId, ExtendSide)> {
        for a in self.active_annotations() {
            if a.kind != AnnotationKind::DeleteSuggestion || a.user_id != self.user_id {
                continue;
            }
            if start_probe.is_some() && a.end.pos == start_probe {
                return Some((a.id, ExtendSide::Right));
            }
            if end_probe.is_some() && a.start.pos == end_probe {
                return Some((a.id, ExtendSide::Left));
            }
        }
        None
    }

    fn append_local(&mut self, id: AnnotationId, body: RecordBody) -> Vec<Event> {
        let timestamp = self.now();
        let record = self.log.stamp_local(PartialRecord { id, user_id: self.user_id.clone(), timestamp, body });
        self.process_and_commit(record)
    }

    /// `insert(index, text, is_suggestion)`.
    pub fn insert(&mut self, index: usize, text: &str, is_suggestion: bool) -> Vec<Event> {
        if text.is_empty() {
            return Vec::new();
        }
        let pre_insert_len = self.text.length();
        let text_events = self.text.insert(&self.sender_id, index, text);
        let mut events: Vec<Event> = text_events.into_iter().map(Event::from_text_event).collect();
        if !is_suggestion {
            return events;
        }

        let char_count = text.chars().count();
        let start_pos = if index == 0 { None } else { Some(self.text.position_of(index - 1)) };
        let end_pos = if index + char_count >= self.text.length() { None } else { Some(self.text.position_of(index + char_count)) };

        if let Some(existing) = self.find_adjacent_insert_suggestion(index, index >= pre_insert_len) {
            let body = RecordBody::RangeUpdate { dependent_on: existing, start: None, end: Some(Endpoint::open(end_pos)), value: None };
            events.extend(self.append_local(AnnotationId::new(), body));
        } else {
            let body = RecordBody::InsertSuggestion { start: Endpoint::open(start_pos), end: Endpoint::open(end_pos) };
            events.extend(self.append_local(AnnotationId::new(), body));
        }
        events
    }

    /// `delete(index, count, is_suggestion)`.
    pub fn delete(&mut self, index: usize, count: usize, is_suggestion: bool) -> Vec<Event> {
        if count == 0 {
            return Vec::new();
        }
        if !is_suggestion || self.find_enclosing_own_insert_suggestion(index, count) {
            return self.text.delete(&self.sender_id, index, count).into_iter().map(Event::from_text_event).collect();
        }

        let start_probe = if index == 0 { None } else { Some(self.text.position_of(index - 1)) };
        let end_probe = if index + count >= self.text.length() { None } else { Some(self.text.position_of(index + count)) };
        let start_pos = self.text.position_of(index);
        let end_pos = self.text.position_of(index + count - 1);

        if let Some((existing, side)) = self.find_adjacent_delete_suggestion(start_probe, end_probe) {
            let body = match side {
                ExtendSide::Right => RecordBody::RangeUpdate { dependent_on: existing, start: None, end: Some(Endpoint::closed(end_pos)), value: None },
                ExtendSide::Left => RecordBody::RangeUpdate { dependent_on: existing, start: Some(Endpoint::closed(start_pos)), end: None, value: None },
            };
            self.append_local(AnnotationId::new(), body)
        } else {
            let body = RecordBody::DeleteSuggestion { start: Endpoint::closed(start_pos), end: Endpoint::closed(end_pos) };
            self.append_local(AnnotationId::new(), body)
        }
    }

    /// `acceptSuggestion(id)`. The text deletion for an
    /// accepted `DeleteSuggestion`, if any, happens inside record
    /// processing, not here — see §9's open-question resolution.
    pub fn accept_suggestion(&mut self, id: AnnotationId) -> Vec<Event> {
        self.append_local(AnnotationId::new(), RecordBody::AcceptSuggestion { dependent_on: id })
    }

    /// `declineSuggestion(id)`.
    pub fn decline_suggestion(&mut self, id: AnnotationId) -> Vec<Event> {
        self.append_local(AnnotationId::new(), RecordBody::DeclineSuggestion { dependent_on: id })
    }

    /// `addComment(start_index, end_index, text)`.
    /// `end_index == length()` is treated as an open end (comment
    /// reaching the document's tail); any other in-range end_index
    /// addresses that position's character directly, per the literal
    /// range wording in §3.
    pub fn add_comment(&mut self, start_index: usize, end_index: usize, text: &str) -> Result<Vec<Event>> {
        let len = self.text.length();
        if start_index >= len || start_index > end_index || end_index > len {
            return Err(EngineError::Record(revtext_common::RevtextError::InvalidRange { start: start_index, end: end_index, len }));
        }
        let start_pos = self.text.position_of(start_index);
        let end = if end_index == len {
            Endpoint::open(None)
        } else {
            Endpoint::closed(self.text.position_of(end_index))
        };
        let body = RecordBody::AddComment { start: Endpoint::closed(start_pos), end, value: text.to_string() };
        Ok(self.append_local(AnnotationId::new(), body))
    }

    /// `removeComment(id)`.
    pub fn remove_comment(&mut self, id: AnnotationId) -> Vec<Event> {
        self.append_local(AnnotationId::new(), RecordBody::RemoveComment { dependent_on: id })
    }

    pub fn snapshot(&self) -> crate::log::Snapshot {
        self.log.snapshot()
    }

    /// Merge a snapshot into this engine's log *and* replay the newly
    /// accepted records through [`Self::process_and_commit`] so the
    /// derived view reflects them too — unlike
    /// [`AnnotationLog::load_snapshot`], which only touches the raw
    /// record store, for use when a log has no attached view.
    pub fn load_snapshot(&mut self, snapshot: &crate::log::Snapshot) {
        let mut offset = 0;
        let mut accepted: Vec<AnnotationRecord> = Vec::new();
        for (idx, &len) in snapshot.lengths.iter().enumerate() {
            let id = snapshot.change_ids[idx];
            let group = &snapshot.records[offset..offset + len];
            offset += len;
            let highest_held = self.log.history(id).iter().map(|r| r.lamport).max();
            for record in group {
                if let Some(highest) = highest_held {
                    if record.lamport <= highest {
                        continue;
                    }
                }
                accepted.push(record.clone());
            }
        }
        accepted.sort_by(cmp_wins);
        for record in accepted {
            self.log.observe_remote_lamport(record.lamport);
            self.process_and_commit(record);
        }
    }
}
