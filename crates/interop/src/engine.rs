use raybridge_sys::{CameraConfig, ProgressCallback};
use std::ffi::{CStr, c_int, c_void};
use std::ptr::NonNull;

/// The engine's call contract.
///
/// One method per C export. Constructors return a possibly-null address;
/// everything that consumes an address is `unsafe` because the engine
/// trusts it blindly. Callers must pass only live addresses produced by the
/// matching constructor of the same engine.
///
/// Implementations: `NativeEngine` (feature `native`) forwards to the
/// linked library; [`crate::DebugEngine`] honors the contract in-process.
pub trait Engine: Send + Sync {
    /// Name for logs and diagnostics.
    fn name(&self) -> &'static str;

    fn create_scene(&self) -> *mut c_void;
    /// # Safety
    /// `scene` is a live scene address; it is dead afterwards.
    unsafe fn destroy_scene(&self, scene: NonNull<c_void>);
    /// # Safety
    /// `scene` is a live scene address.
    unsafe fn clear_scene(&self, scene: NonNull<c_void>);
    /// # Safety
    /// `scene` and `material` are live addresses of this engine.
    unsafe fn add_sphere(
        &self,
        scene: NonNull<c_void>,
        center: [f64; 3],
        radius: f64,
        material: NonNull<c_void>,
    );

    fn create_diffuse_material(&self, albedo: [f64; 3]) -> *mut c_void;
    fn create_reflective_material(&self, albedo: [f64; 3], fuzz: f64) -> *mut c_void;
    fn create_refractive_material(&self, refraction_index: f64) -> *mut c_void;
    /// # Safety
    /// `material` is a live material address; it is dead afterwards.
    unsafe fn destroy_material(&self, material: NonNull<c_void>);

    /// Render synchronously into `out_pixels`, calling `progress` on this
    /// thread zero or more times.
    ///
    /// # Safety
    /// `scene` is live, every material it references is live, and
    /// `out_pixels` is valid for writes of `width * height * 4` bytes as
    /// derived from `config`, for the whole call.
    unsafe fn render_scene(
        &self,
        scene: NonNull<c_void>,
        config: CameraConfig,
        out_pixels: NonNull<u8>,
        progress: ProgressCallback,
    );

    /// Encode `pixels` to `path` and return the engine's raw status.
    ///
    /// # Safety
    /// `pixels` is valid for reads of `width * height * 4` bytes.
    unsafe fn save_pixels(
        &self,
        path: &CStr,
        width: i32,
        height: i32,
        pixels: NonNull<u8>,
    ) -> c_int;

    /// How to read the status returned by `save_pixels`. No default: every
    /// engine states its own.
    fn save_convention(&self) -> SaveConvention;
}

/// Which save statuses mean success. The code space is otherwise opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveConvention {
    /// 0 is success, anything else is failure.
    ZeroOnSuccess,
    /// 0 is failure, anything else is success (the PNG encoder's result).
    NonZeroOnSuccess,
}

impl SaveConvention {
    pub fn succeeded(self, status: c_int) -> bool {
        match self {
            Self::ZeroOnSuccess => status == 0,
            Self::NonZeroOnSuccess => status != 0,
        }
    }

    /// A status this convention reads as success or failure.
    pub fn status(self, success: bool) -> c_int {
        match (self, success) {
            (Self::ZeroOnSuccess, true) | (Self::NonZeroOnSuccess, false) => 0,
            (Self::ZeroOnSuccess, false) | (Self::NonZeroOnSuccess, true) => 1,
        }
    }
}

/// The linked engine library.
#[cfg(feature = "native")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

#[cfg(feature = "native")]
impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "native")]
impl Engine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn create_scene(&self) -> *mut c_void {
        // SAFETY: no arguments; the engine returns an owned address or null.
        unsafe { raybridge_sys::create_scene() }
    }

    unsafe fn destroy_scene(&self, scene: NonNull<c_void>) {
        unsafe { raybridge_sys::destroy_scene(scene.as_ptr()) }
    }

    unsafe fn clear_scene(&self, scene: NonNull<c_void>) {
        unsafe { raybridge_sys::scene_clear(scene.as_ptr()) }
    }

    unsafe fn add_sphere(
        &self,
        scene: NonNull<c_void>,
        [x, y, z]: [f64; 3],
        radius: f64,
        material: NonNull<c_void>,
    ) {
        unsafe { raybridge_sys::scene_add_sphere(scene.as_ptr(), x, y, z, radius, material.as_ptr()) }
    }

    fn create_diffuse_material(&self, [r, g, b]: [f64; 3]) -> *mut c_void {
        // SAFETY: plain values in, owned address or null out.
        unsafe { raybridge_sys::create_lambertian(r, g, b) }
    }

    fn create_reflective_material(&self, [r, g, b]: [f64; 3], fuzz: f64) -> *mut c_void {
        // SAFETY: as above.
        unsafe { raybridge_sys::create_metal(r, g, b, fuzz) }
    }

    fn create_refractive_material(&self, refraction_index: f64) -> *mut c_void {
        // SAFETY: as above.
        unsafe { raybridge_sys::create_dielectric(refraction_index) }
    }

    unsafe fn destroy_material(&self, material: NonNull<c_void>) {
        unsafe { raybridge_sys::destroy_material(material.as_ptr()) }
    }

    unsafe fn render_scene(
        &self,
        scene: NonNull<c_void>,
        config: CameraConfig,
        out_pixels: NonNull<u8>,
        progress: ProgressCallback,
    ) {
        unsafe { raybridge_sys::render_scene(scene.as_ptr(), config, out_pixels.as_ptr(), progress) }
    }

    unsafe fn save_pixels(
        &self,
        path: &CStr,
        width: i32,
        height: i32,
        pixels: NonNull<u8>,
    ) -> c_int {
        unsafe { raybridge_sys::save_png(path.as_ptr(), width, height, pixels.as_ptr()) }
    }

    // The export forwards the PNG encoder's result, which is 0 on failure.
    fn save_convention(&self) -> SaveConvention {
        SaveConvention::NonZeroOnSuccess
    }
}
