//! Shared identifiers, error types, and configuration for the review-mode CRDT.
//!
//! Split out of `revtext-core` so that `revtext-text` (the reference
//! Position Service / Text CRDT) can depend on the same `SenderId`/error
//! vocabulary without depending on the engine itself.

pub mod error;
pub mod ids;

pub use error::{RevtextError, Result};
pub use ids::{AnnotationId, Lamport, SenderId, UserId};

/// Replica-construction configuration: `{ user_id: string }` at
/// construction, no environment variables, no CLI. (A demo binary may
/// layer CLI flags on top of this — see `revtext-cli` — but the library
/// itself only ever reads this struct.)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub user_id: UserId,
}

impl Config {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_wraps_user_id() {
        let cfg = Config::new("alice");
        assert_eq!(cfg.user_id.as_str(), "alice");
    }
}
