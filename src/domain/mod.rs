//! Domain layer types and invariants.

pub mod event;
pub mod target;
