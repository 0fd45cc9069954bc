//! Utility types used throughout the crate.
//!
//! - [`Name`] - Interned strings for path segments, tags and attribute keys
//! - [`Error`] / [`Result`] - Error handling
//! - [`BBox3d`] and math re-exports from glam

mod error;
mod math;
mod name;

pub use error::*;
pub use math::*;
pub use name::*;
