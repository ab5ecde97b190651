//! End-to-end scenarios exercising the engine over the reference RGA
//! text CRDT, one test per scenario in the testable-properties
//! section. Character replication between replicas goes through
//! `TrackChangesEngine::apply_remote_insert`/`apply_remote_delete`
//! (the Text CRDT's own concern); annotation replication goes through
//! `receive_remote`, fed by `last_record()` after each local op.

use revtext_common::{Config, SenderId};
use revtext_core::record::AnnotationKind;
use revtext_core::RemovalReason;
use revtext_core::TrackChangesEngine;
use revtext_text::RgaText;

fn engine(user: &str, replica: &str) -> TrackChangesEngine<RgaText> {
    TrackChangesEngine::new(Config::new(user), SenderId::from(replica), RgaText::new())
}

/// S1: two plain (non-suggestion) inserts on one replica, relayed
/// character-for-character to an idle second replica, converge to the
/// same text with no live annotations.
#[test]
fn s1_plain_inserts_converge_with_no_annotations() {
    let mut x = engine("u1", "x");
    let mut y = engine("u1", "y");

    x.insert(0, "Hi", false);
    y.apply_remote_insert(x.sender_id(), 0, "Hi");

    x.insert(2, " world", false);
    y.apply_remote_insert(x.sender_id(), 2, " world");

    assert_eq!(x.to_string(), "Hi world");
    assert_eq!(y.to_string(), "Hi world");
    assert!(x.active_annotations().is_empty());
    assert!(y.active_annotations().is_empty());
}

/// S2: two replicas concurrently insert-suggest at index 0. After
/// exchanging characters and records, both converge on the same text
/// and each replica's insertion is covered by its own live
/// InsertSuggestion.
#[test]
fn s2_concurrent_insert_suggestions_both_survive() {
    let mut x = engine("u1", "x");
    let mut y = engine("u2", "y");

    x.insert(0, "Hello", true);
    let x_record = x.last_record().unwrap();
    y.insert(0, "Hey", true);
    let y_record = y.last_record().unwrap();

    let x_sender = x.sender_id().clone();
    let y_sender = y.sender_id().clone();
    x.apply_remote_insert(&y_sender, 0, "Hey");
    y.apply_remote_insert(&x_sender, 0, "Hello");

    x.receive_remote(y_record);
    y.receive_remote(x_record);

    assert_eq!(x.to_string(), y.to_string());
    assert_eq!(x.to_string().chars().count(), "HelloHey".chars().count());

    let x_live = x.active_annotations();
    let y_live = y.active_annotations();
    assert_eq!(x_live.len(), 2);
    assert_eq!(y_live.len(), 2);
    assert!(x_live.iter().any(|a| a.kind == AnnotationKind::InsertSuggestion && a.user_id.as_str() == "u1"));
    assert!(x_live.iter().any(|a| a.kind == AnnotationKind::InsertSuggestion && a.user_id.as_str() == "u2"));
}

/// S3: a delete-suggestion followed by an accept deletes the
/// suggested span and tombstones the annotation with reason Accepted.
#[test]
fn s3_accepted_delete_suggestion_removes_text() {
    let mut x = engine("u1", "x");
    x.insert(0, "abcdef", false);
    x.delete(1, 3, true);

    assert_eq!(x.to_string(), "abcdef");
    let live = x.active_annotations();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].kind, AnnotationKind::DeleteSuggestion);
    let id = live[0].id;

    let events = x.accept_suggestion(id);
    assert_eq!(x.to_string(), "aef");
    assert!(x.active_annotations().is_empty());

    let removed = events.iter().find_map(|e| match e {
        revtext_core::Event::AnnotationRemoved { annotation, reason, .. } => Some((annotation.id, *reason)),
        _ => None,
    });
    assert_eq!(removed, Some((id, RemovalReason::Accepted)));
    let delete_fired = events.iter().filter(|e| matches!(e, revtext_core::Event::Delete { .. })).count();
    assert_eq!(delete_fired, 1);
}

/// S4: concurrent accept and decline of the same suggestion resolve by
/// `wins` — whichever Removal has the larger `(lamport, sender)` is
/// the effective terminating record, and both replicas converge on
/// its outcome.
#[test]
fn s4_concurrent_accept_and_decline_resolve_by_wins() {
    let mut x = engine("u1", "x");
    let mut y = engine("u2", "y");

    x.insert(0, "hello", false);
    let x_sender = x.sender_id().clone();
    y.apply_remote_insert(&x_sender, 0, "hello");

    let add_events = x.delete(0, 5, true);
    assert!(!add_events.is_empty());
    let addition = x.last_record().unwrap();
    let id = addition.id;
    y.receive_remote(addition);

    let accept_record = {
        y.accept_suggestion(id);
        y.last_record().unwrap()
    };
    let decline_record = {
        x.decline_suggestion(id);
        x.last_record().unwrap()
    };

    let accept_wins = revtext_core::order::wins(&accept_record, &decline_record);

    x.receive_remote(accept_record);
    y.receive_remote(decline_record);

    assert_eq!(x.to_string(), y.to_string());
    if accept_wins {
        assert_eq!(x.to_string(), "");
    } else {
        assert_eq!(x.to_string(), "hello");
    }
}

/// S5: a comment over a span concurrently deleted by a plain edit
/// survives with tombstoned-but-remembered positions; it stays the
/// single live annotation after sync, and can still be removed
/// cleanly afterward.
#[test]
fn s5_comment_over_concurrently_deleted_span_survives() {
    let mut x = engine("u1", "x");
    let mut y = engine("u1", "y");

    x.insert(0, "abcdef", false);
    let x_sender = x.sender_id().clone();
    y.apply_remote_insert(&x_sender, 0, "abcdef");

    let comment_events = x.add_comment(2, 4, "why?").unwrap();
    assert!(!comment_events.is_empty());
    let comment = x.last_record().unwrap();
    let id = comment.id;

    y.delete(2, 2, false);
    let y_sender = y.sender_id().clone();
    x.apply_remote_delete(&y_sender, 2, 2);
    y.receive_remote(comment);

    assert_eq!(x.to_string(), "abef");
    assert_eq!(y.to_string(), "abef");

    let live = y.active_annotations();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, id);
    assert_eq!(live[0].kind, AnnotationKind::Comment);

    let removed = y.remove_comment(id);
    assert!(y.active_annotations().is_empty());
    assert!(removed.iter().any(|e| matches!(e, revtext_core::Event::AnnotationRemoved { reason: RemovalReason::Removed, .. })));
}

/// S6: two same-user inserts in immediate succession merge into one
/// InsertSuggestion via an Update rather than producing two
/// Additions; a concurrent decline seen only after the first insert
/// still terminates the whole, now-extended, annotation.
#[test]
fn s6_adjacent_same_user_inserts_merge_via_update() {
    let mut x = engine("u1", "x");
    x.insert(0, "ab", true);
    let first = x.last_record().unwrap();
    let id = first.id;

    x.insert(2, "cd", true);
    let second = x.last_record().unwrap();
    assert_eq!(second.annotation_id(), id);

    let live = x.active_annotations();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, id);
    assert_eq!(x.to_string(), "abcd");

    let mut y = engine("u2", "y");
    y.receive_remote(first);
    y.decline_suggestion(id);
    let decline_record = y.last_record().unwrap();

    let events = x.receive_remote(decline_record);
    assert_eq!(x.to_string(), "");
    assert!(x.active_annotations().is_empty());
    assert!(events.iter().any(|e| matches!(e, revtext_core::Event::Delete { .. })));
}

/// S7: a snapshot taken mid-session, loaded into a fresh replica,
/// reproduces the derived view, and reloading the same snapshot again
/// is a no-op.
#[test]
fn s7_snapshot_roundtrip_rebuilds_the_derived_view() {
    let mut x = engine("u1", "x");
    x.insert(0, "hello world", false);
    x.insert(0, "intro ", true);
    let comment_events = x.add_comment(0, 3, "note").unwrap();
    assert!(!comment_events.is_empty());
    let comment_id = x.last_record().unwrap().id;

    let snapshot = x.snapshot();

    let mut z = engine("u1", "z-restored");
    z.load_snapshot(&snapshot);

    assert_eq!(z.active_annotations().len(), x.active_annotations().len());
    assert!(z.active_annotations().iter().any(|a| a.id == comment_id));

    let before = z.active_annotations().len();
    z.load_snapshot(&snapshot);
    assert_eq!(z.active_annotations().len(), before);
}
