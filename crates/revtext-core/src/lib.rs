//! revtext-core: the annotation log and track-changes engine for
//! review-mode (track-changes/suggestion-mode) text editing.
//!
//! - **record**: the annotation record sum type and the folding rule
//!   that turns an Addition plus its Updates into an effective shape.
//! - **log**: the append-only, causally-ordered annotation log.
//! - **engine**: the track-changes engine — the derived view and the
//!   public `insert`/`delete`/`acceptSuggestion`/`declineSuggestion`/
//!   `addComment`/`removeComment` operations.
//! - **transport**: the consumed transport boundary, plus an
//!   in-process reference implementation for tests.
//! - **wire**: the bit-stable binary record format.

pub mod engine;
pub mod error;
pub mod log;
pub mod order;
pub mod record;
pub mod transport;
pub mod wire;

pub use engine::{EffectiveAnnotation, Event, RemovalReason, TrackChangesEngine};
pub use error::{EngineError, Result};
pub use log::{AnnotationLog, Snapshot};
pub use record::{Action, AnnotationKind, AnnotationRecord, Endpoint, PartialRecord, RecordBody};
pub use revtext_common::{AnnotationId, Config, Lamport, SenderId, UserId};
