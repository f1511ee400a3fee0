//! Shared value types for the engine bridge.
//!
//! Everything here is plain data: nothing in this crate touches the native
//! engine. Values are validated here and converted to the C layout by
//! `raybridge-interop`.
//!
//! # Invariants
//! - A `Camera` that passes `validate()` maps to a well-formed native struct.
//! - Scene descriptions only reference materials they declare.

mod camera;
mod description;
mod types;

pub use camera::{Camera, MAX_IMAGE_WIDTH};
pub use description::{DescriptionError, SceneDescription, SphereDescription};
pub use types::{InvalidArgument, MaterialParams, Rgb};

pub fn crate_info() -> &'static str {
    "raybridge-common v0.1.0"
}
