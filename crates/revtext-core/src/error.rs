//! Errors for the annotation log and track-changes engine.
//!
//! Shares its four kinds with `revtext_common::RevtextError` — that
//! type already covers this crate's needs, so `EngineError` is just
//! the name this crate's public API uses for it, plus the wire-decode
//! failure variant that only makes sense once a byte format exists.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Record(#[from] revtext_common::RevtextError),

    #[error("wire decode error: {0}")]
    Decode(String),
}

impl EngineError {
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Record(e) if e.is_recoverable())
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Decode(_)) || matches!(self, EngineError::Record(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtext_common::AnnotationId;

    #[test]
    fn decode_errors_are_fatal() {
        let err = EngineError::Decode("truncated buffer".into());
        assert!(err.is_fatal());
    }

    #[test]
    fn wrapped_missing_dependency_is_recoverable() {
        let err: EngineError = revtext_common::RevtextError::MissingDependency(AnnotationId::new()).into();
        assert!(err.is_recoverable());
    }
}
