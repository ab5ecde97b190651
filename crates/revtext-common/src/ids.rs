//! Identifiers shared between the annotation log, the engine, and the
//! reference text CRDT.

use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(UserId, "Author of an operation, supplied by the caller.");
string_id!(
    SenderId,
    "Replica identifier stamped by the transport on every delivered record."
);

/// Lamport clock value stamped by the transport. Comparisons for the
/// `wins` tie-break combine this with `SenderId`; `Lamport` on its own
/// is just a total order on "logical time at the sender".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Lamport(pub u64);

impl Lamport {
    pub const ZERO: Lamport = Lamport(0);

    pub fn next(self) -> Lamport {
        Lamport(self.0 + 1)
    }
}

impl fmt::Display for Lamport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique identifier for an annotation, minted once at the
/// annotation's Addition record and reused by every dependent Update
/// or Removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct AnnotationId(pub Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_ids_are_unique() {
        assert_ne!(AnnotationId::new(), AnnotationId::new());
    }

    #[test]
    fn lamport_orders_like_an_integer() {
        assert!(Lamport(1) < Lamport(2));
        assert_eq!(Lamport(5).next(), Lamport(6));
    }

    #[test]
    fn user_id_roundtrips_through_display() {
        let id = UserId::from("alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(id.as_str(), "alice");
    }
}
