//! Error types for the review-mode CRDT.

use thiserror::Error;

/// Result type used throughout the crate family.
pub type Result<T> = std::result::Result<T, RevtextError>;

/// The four top-level error kinds, plus wrapped lower-level causes.
///
/// `InvalidRange` is the only variant a caller should expect to see
/// synchronously from a public operation; the others are recovered
/// internally (logged and dropped) by the annotation log and engine,
/// and are only constructed here so tests and callers that want to
/// observe the drop can match on a concrete type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RevtextError {
    /// `addComment` called with an out-of-bounds or inverted range.
    #[error("invalid range [{start}, {end}) for document of length {len}")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },

    /// A Removal/Update referenced an annotation id that hasn't (yet)
    /// been delivered as an Addition. Recovered by dropping the record.
    #[error("record for {0} has no matching Addition in the log")]
    MissingDependency(crate::AnnotationId),

    /// A Removal/Update strictly dominated by a later Removal already
    /// held for the same annotation id. Recovered by dropping silently.
    #[error("stale operation for {0}, a newer Removal already won")]
    StaleOp(crate::AnnotationId),

    /// Unknown action/description combination, a missing mandatory
    /// range field, or a wire-format decode failure. Fatal to the
    /// replica that observed it.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RevtextError {
    /// Whether this condition is recoverable by simply dropping the
    /// record.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RevtextError::MissingDependency(_) | RevtextError::StaleOp(_)
        )
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, RevtextError::MalformedRecord(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnnotationId;

    #[test]
    fn missing_dependency_is_recoverable() {
        let err = RevtextError::MissingDependency(AnnotationId::new());
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn malformed_record_is_fatal() {
        let err = RevtextError::MalformedRecord("unknown action tag 7".into());
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn invalid_range_is_neither() {
        let err = RevtextError::InvalidRange {
            start: 5,
            end: 2,
            len: 10,
        };
        assert!(!err.is_recoverable());
        assert!(!err.is_fatal());
    }
}
