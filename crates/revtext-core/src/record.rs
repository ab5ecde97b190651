//! The annotation record sum type (the action/description matrix),
//! modeled as a closed tagged union — a `#[serde(tag = "type")]` enum
//! of structurally distinct variants — rather than open inheritance.

use revtext_common::{AnnotationId, Lamport, SenderId, UserId};
use revtext_text::position::Position;

/// One end of an annotation's range. `pos: None` means "open" — to the
/// document start for a start endpoint, to the document end for an end
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub pos: Option<Position>,
    pub closed: bool,
}

impl Endpoint {
    pub fn open(pos: Option<Position>) -> Self {
        Self { pos, closed: false }
    }

    pub fn closed(pos: Position) -> Self {
        Self { pos: Some(pos), closed: true }
    }
}

/// Coarse action tag, kept mainly because the wire format and the
/// action/description table are organized around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Addition,
    Removal,
    Update,
}

/// The bucket an effective annotation belongs to in the derived view:
/// kind maps to a list of live additions. `Comment` folds the single
/// `AddComment` description into one bucket since comments have no
/// polarity to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    InsertSuggestion,
    DeleteSuggestion,
    Comment,
}

/// The full action/description matrix. Each variant carries exactly
/// the extra fields its row of the table specifies;
/// invalid combinations (e.g. an `AcceptSuggestion` with range fields)
/// are simply not representable.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RecordBody {
    InsertSuggestion { start: Endpoint, end: Endpoint },
    DeleteSuggestion { start: Endpoint, end: Endpoint },
    AddComment { start: Endpoint, end: Endpoint, value: String },
    AcceptSuggestion { dependent_on: AnnotationId },
    DeclineSuggestion { dependent_on: AnnotationId },
    RemoveComment { dependent_on: AnnotationId },
    RangeUpdate {
        dependent_on: AnnotationId,
        start: Option<Endpoint>,
        end: Option<Endpoint>,
        value: Option<String>,
    },
}

impl RecordBody {
    pub fn action(&self) -> Action {
        match self {
            RecordBody::InsertSuggestion { .. }
            | RecordBody::DeleteSuggestion { .. }
            | RecordBody::AddComment { .. } => Action::Addition,
            RecordBody::AcceptSuggestion { .. }
            | RecordBody::DeclineSuggestion { .. }
            | RecordBody::RemoveComment { .. } => Action::Removal,
            RecordBody::RangeUpdate { .. } => Action::Update,
        }
    }

    pub fn dependent_on(&self) -> Option<AnnotationId> {
        match self {
            RecordBody::AcceptSuggestion { dependent_on }
            | RecordBody::DeclineSuggestion { dependent_on }
            | RecordBody::RemoveComment { dependent_on }
            | RecordBody::RangeUpdate { dependent_on, .. } => Some(*dependent_on),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<AnnotationKind> {
        match self {
            RecordBody::InsertSuggestion { .. } => Some(AnnotationKind::InsertSuggestion),
            RecordBody::DeleteSuggestion { .. } => Some(AnnotationKind::DeleteSuggestion),
            RecordBody::AddComment { .. } => Some(AnnotationKind::Comment),
            _ => None,
        }
    }

    pub fn is_addition(&self) -> bool {
        self.action() == Action::Addition
    }

    pub fn is_removal(&self) -> bool {
        self.action() == Action::Removal
    }
}

/// What a caller supplies to [`crate::log::AnnotationLog::stamp_local`];
/// everything the transport is responsible for (`lamport`, `sender_id`)
/// is filled in afterward.
#[derive(Debug, Clone)]
pub struct PartialRecord {
    pub id: AnnotationId,
    pub user_id: UserId,
    pub timestamp: u64,
    pub body: RecordBody,
}

/// A fully-stamped record as it lives in the annotation log.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationRecord {
    pub id: AnnotationId,
    pub user_id: UserId,
    pub lamport: Lamport,
    pub sender_id: SenderId,
    pub timestamp: u64,
    pub body: RecordBody,
}

impl AnnotationRecord {
    /// The id of the annotation this record concerns: itself, for an
    /// Addition; the `dependent_on` target, for an Update or Removal.
    pub fn annotation_id(&self) -> AnnotationId {
        self.body.dependent_on().unwrap_or(self.id)
    }
}

/// The effective, folded-together shape of an annotation at a point in
/// time: its originating Addition with every Update applied on top, in
/// `wins` order. This is what the derived view stores and what
/// `AnnotationAdded`/`AnnotationRemoved` events carry — never a raw
/// `AnnotationRecord`, which only makes sense in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveAnnotation {
    pub id: AnnotationId,
    pub user_id: UserId,
    pub kind: AnnotationKind,
    pub start: Endpoint,
    pub end: Endpoint,
    pub value: Option<String>,
}

/// Fold an Addition record and its Updates (already in ascending
/// `wins` order) into the annotation's current effective shape —
/// the `Addition ⊕ updates` composition.
pub fn fold<'a>(addition: &AnnotationRecord, updates: impl Iterator<Item = &'a AnnotationRecord>) -> EffectiveAnnotation {
    let (mut start, mut end, mut value, kind) = match &addition.body {
        RecordBody::InsertSuggestion { start, end } => (*start, *end, None, AnnotationKind::InsertSuggestion),
        RecordBody::DeleteSuggestion { start, end } => (*start, *end, None, AnnotationKind::DeleteSuggestion),
        RecordBody::AddComment { start, end, value } => (*start, *end, Some(value.clone()), AnnotationKind::Comment),
        _ => unreachable!("fold() called with a non-Addition record as the base"),
    };
    for update in updates {
        if let RecordBody::RangeUpdate { start: s, end: e, value: v, .. } = &update.body {
            if let Some(s) = s {
                start = *s;
            }
            if let Some(e) = e {
                end = *e;
            }
            if let Some(v) = v {
                value = Some(v.clone());
            }
        }
    }
    EffectiveAnnotation {
        id: addition.id,
        user_id: addition.user_id.clone(),
        kind,
        start,
        end,
        value,
    }
}
