//! Application layer: the render pipeline and the collaborator ports it drives.

pub mod builder;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod render;
pub mod validation;
