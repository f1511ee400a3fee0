//! Safe call boundary around an external ray tracing engine.
//!
//! The engine hands out opaque addresses for scenes and materials, renders
//! synchronously into a caller-provided buffer, and reports progress through
//! a C function pointer. This crate owns those addresses, validates every
//! argument before it crosses, and turns engine failures into
//! [`BridgeError`] values.
//!
//! [`Bridge`] is the entry point. It talks to an [`Engine`]: the linked
//! library (`NativeEngine`, feature `native`) or the in-process
//! [`DebugEngine`].
//!
//! # Invariants
//! - Each engine address is destroyed exactly once, by its owner.
//! - A scene cannot outlive the materials it references.
//! - Nothing reaches the engine after a check fails.
//! - The render buffer stays at one address from before the call until
//!   after the last progress notification.

mod bridge;
mod debug_engine;
mod engine;
mod error;
mod handle;
mod image;
mod layout;
mod material;
mod render;
mod scene;

pub use bridge::Bridge;
pub use debug_engine::{DebugEngine, DebugSphere, DebugStats, ProgressFault};
#[cfg(feature = "native")]
pub use engine::NativeEngine;
pub use engine::{Engine, SaveConvention};
pub use error::BridgeError;
pub use handle::{Destructor, NativeHandle};
pub use layout::to_native_layout;
pub use material::{Material, MaterialLibrary};
pub use render::{PixelBuffer, RenderProgress};
pub use scene::Scene;

pub fn crate_info() -> &'static str {
    "raybridge-interop v0.1.0"
}
