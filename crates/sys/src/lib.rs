//! Raw C ABI of the external ray tracing engine.
//!
//! # Invariants
//! - `CameraConfig` matches the engine's struct byte for byte.
//! - The `extern` block only exists with the `native` feature, so the rest of
//!   the workspace builds and tests without the engine library.
//!
//! Nothing here is safe to call directly; `raybridge-interop` owns every
//! handle and buffer that crosses this boundary.

use bytemuck::{Pod, Zeroable};
use std::ffi::{c_char, c_int, c_void};

/// Progress notification: samples completed so far and the output buffer
/// the engine is writing. There is no user-data argument.
pub type ProgressCallback = extern "C" fn(samples: c_int, buffer: *mut u8);

/// Camera parameters as laid out by the engine.
///
/// `_padding` is the slot a C compiler inserts before the 8-byte aligned
/// `vertical_fov`; naming it keeps the struct `Pod` and always zeroed.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CameraConfig {
    pub aspect_ratio: f64,
    pub image_width: i32,
    pub samples_per_pixel: i32,
    pub max_depth: i32,
    pub _padding: i32,
    pub vertical_fov: f64,
    pub look_from: [f64; 3],
    pub look_at: [f64; 3],
    pub up: [f64; 3],
    pub defocus_angle: f64,
    pub focus_distance: f64,
}

/// Opaque engine-side scene (a list of hittables).
pub type RawScene = *mut c_void;
/// Opaque engine-side material (a shared material pointer).
pub type RawMaterial = *mut c_void;

#[cfg(feature = "native")]
unsafe extern "C" {
    #[link_name = "CreateScene"]
    pub fn create_scene() -> RawScene;
    #[link_name = "DestroyScene"]
    pub fn destroy_scene(scene: RawScene);
    #[link_name = "SceneClear"]
    pub fn scene_clear(scene: RawScene);
    #[link_name = "SceneAddSphere"]
    pub fn scene_add_sphere(
        scene: RawScene,
        cx: f64,
        cy: f64,
        cz: f64,
        radius: f64,
        material: RawMaterial,
    );

    #[link_name = "CreateLambertian"]
    pub fn create_lambertian(r: f64, g: f64, b: f64) -> RawMaterial;
    #[link_name = "CreateMetal"]
    pub fn create_metal(r: f64, g: f64, b: f64, fuzz: f64) -> RawMaterial;
    #[link_name = "CreateDielectric"]
    pub fn create_dielectric(refraction_index: f64) -> RawMaterial;
    #[link_name = "DestroyMaterial"]
    pub fn destroy_material(material: RawMaterial);

    /// Blocks until the image is complete.
    #[link_name = "RenderScene"]
    pub fn render_scene(
        scene: RawScene,
        config: CameraConfig,
        out_pixels: *mut u8,
        callback: ProgressCallback,
    );

    /// Returns the encoder's status; 0 means the file was not written.
    #[link_name = "SavePng"]
    pub fn save_png(
        filename: *const c_char,
        width: i32,
        height: i32,
        pixels: *const u8,
    ) -> c_int;
}

pub fn crate_info() -> &'static str {
    "raybridge-sys v0.1.0"
}
