//! Domain layer types and invariants.

pub mod filename;
pub mod payload;
pub mod tree;
