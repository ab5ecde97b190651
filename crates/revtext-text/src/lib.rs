//! Reference Position Service and Text CRDT.
//!
//! The review-mode engine in `revtext-core` treats the underlying text
//! as an external dependency it only ever touches through the
//! [`PositionService`]/[`TextCrdt`] traits in [`position`]. This crate
//! supplies [`rga::RgaText`], a small RGA-style implementation of that
//! contract, so the engine's tests have something real to run against
//! without pulling in a full production rope CRDT.

pub mod position;
pub mod rga;

pub use position::{Bias, PositionService, Resolved, TextCrdt, TextEvent};
pub use rga::RgaText;
