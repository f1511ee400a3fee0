//! In-process engine that follows the call contract without a native library.
//!
//! It does not trace rays. It keeps the same bookkeeping the real engine
//! does (scenes, materials, spheres), fills the output buffer with a
//! gradient whose blue channel tracks the sample count, and writes PAM files
//! instead of PNG. Every call is counted so tests can check how many times
//! constructors and destructors crossed the boundary. Faults can be injected
//! to exercise the failure paths of the bridge.

use raybridge_common::{MaterialParams, Rgb};
use raybridge_sys::{CameraConfig, ProgressCallback};
use std::collections::HashMap;
use std::ffi::{CStr, c_int, c_void};
use std::io::Write;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::engine::SaveConvention;
use crate::scene::Scene;

/// Call counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugStats {
    pub scenes_created: usize,
    pub scenes_destroyed: usize,
    pub scene_clears: usize,
    pub spheres_added: usize,
    pub materials_created: usize,
    pub materials_destroyed: usize,
    pub renders: usize,
    pub progress_notifications: usize,
    pub saves: usize,
    /// Calls that named an address this engine never issued or already freed.
    pub invalid_handles: usize,
}

/// Ways to break the progress contract on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressFault {
    /// Report an address other than the output buffer.
    ForeignBuffer,
    /// Report a sample count lower than the previous one.
    SampleRegression,
    /// Report more samples than the camera asked for.
    SampleOverflow,
}

/// A sphere as the engine received it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugSphere {
    pub center: [f64; 3],
    pub radius: f64,
    /// Address of the material, as an integer.
    pub material: usize,
}

#[derive(Debug)]
struct DebugState {
    next_addr: usize,
    scenes: HashMap<usize, Vec<DebugSphere>>,
    materials: HashMap<usize, MaterialParams>,
    stats: DebugStats,
    allocation_budget: Option<usize>,
    save_status: Option<c_int>,
    save_convention: SaveConvention,
    progress_fault: Option<ProgressFault>,
    progress_stride: Option<i32>,
}

/// See the module docs.
#[derive(Debug)]
pub struct DebugEngine {
    state: Mutex<DebugState>,
}

impl Default for DebugEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DebugState {
                next_addr: 0x1000,
                scenes: HashMap::new(),
                materials: HashMap::new(),
                stats: DebugStats::default(),
                allocation_budget: None,
                save_status: None,
                save_convention: SaveConvention::ZeroOnSuccess,
                progress_fault: None,
                progress_stride: None,
            }),
        }
    }

    /// Notify every `stride` samples instead of roughly ten times per render.
    pub fn with_progress_stride(self, stride: u32) -> Self {
        self.lock().progress_stride = Some(i32::try_from(stride.max(1)).unwrap_or(i32::MAX));
        self
    }

    /// Report save results under `convention` (0 on success by default).
    pub fn with_save_convention(self, convention: SaveConvention) -> Self {
        self.lock().save_convention = convention;
        self
    }

    /// Make every constructor return null.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.set_allocation_budget(fail.then_some(0));
    }

    /// Allow `budget` more successful constructor calls, then return null.
    /// `None` removes the limit.
    pub fn set_allocation_budget(&self, budget: Option<usize>) {
        self.lock().allocation_budget = budget;
    }

    /// Return `status` from every save without writing a file, whatever the
    /// convention says it means.
    pub fn set_save_status(&self, status: Option<c_int>) {
        self.lock().save_status = status;
    }

    pub fn set_progress_fault(&self, fault: Option<ProgressFault>) {
        self.lock().progress_fault = fault;
    }

    pub fn stats(&self) -> DebugStats {
        self.lock().stats
    }

    pub fn live_scenes(&self) -> usize {
        self.lock().scenes.len()
    }

    pub fn live_materials(&self) -> usize {
        self.lock().materials.len()
    }

    /// Spheres held engine-side by `scene`, or `None` if it is not live here.
    pub fn sphere_count(&self, scene: &Scene<'_>) -> Option<usize> {
        let raw = scene.raw().ok()?;
        self.lock().scenes.get(&raw.as_ptr().addr()).map(Vec::len)
    }

    /// Spheres held engine-side by `scene`, in insertion order.
    pub fn spheres(&self, scene: &Scene<'_>) -> Option<Vec<DebugSphere>> {
        let raw = scene.raw().ok()?;
        self.lock().scenes.get(&raw.as_ptr().addr()).cloned()
    }

    /// Parameters of a live material, looked up by address.
    pub fn material_params(&self, material: NonNull<c_void>) -> Option<MaterialParams> {
        self.lock().materials.get(&material.as_ptr().addr()).copied()
    }

    fn lock(&self) -> MutexGuard<'_, DebugState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(state: &mut DebugState) -> Option<usize> {
        if let Some(budget) = state.allocation_budget.as_mut() {
            if *budget == 0 {
                return None;
            }
            *budget -= 1;
        }
        let addr = state.next_addr;
        state.next_addr += 0x10;
        Some(addr)
    }

    fn create_material(&self, params: MaterialParams) -> *mut c_void {
        let mut state = self.lock();
        let Some(addr) = Self::allocate(&mut state) else {
            return std::ptr::null_mut();
        };
        state.materials.insert(addr, params);
        state.stats.materials_created += 1;
        std::ptr::without_provenance_mut(addr)
    }
}

impl crate::engine::Engine for DebugEngine {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn create_scene(&self) -> *mut c_void {
        let mut state = self.lock();
        let Some(addr) = Self::allocate(&mut state) else {
            return std::ptr::null_mut();
        };
        state.scenes.insert(addr, Vec::new());
        state.stats.scenes_created += 1;
        std::ptr::without_provenance_mut(addr)
    }

    unsafe fn destroy_scene(&self, scene: NonNull<c_void>) {
        let mut state = self.lock();
        if state.scenes.remove(&scene.as_ptr().addr()).is_some() {
            state.stats.scenes_destroyed += 1;
        } else {
            state.stats.invalid_handles += 1;
            tracing::warn!(addr = ?scene, "destroy of unknown scene");
        }
    }

    unsafe fn clear_scene(&self, scene: NonNull<c_void>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.scenes.get_mut(&scene.as_ptr().addr()) {
            Some(spheres) => {
                spheres.clear();
                state.stats.scene_clears += 1;
            }
            None => state.stats.invalid_handles += 1,
        }
    }

    unsafe fn add_sphere(
        &self,
        scene: NonNull<c_void>,
        center: [f64; 3],
        radius: f64,
        material: NonNull<c_void>,
    ) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let material = material.as_ptr().addr();
        if !state.materials.contains_key(&material) {
            state.stats.invalid_handles += 1;
            return;
        }
        match state.scenes.get_mut(&scene.as_ptr().addr()) {
            Some(spheres) => {
                spheres.push(DebugSphere {
                    center,
                    radius,
                    material,
                });
                state.stats.spheres_added += 1;
            }
            None => state.stats.invalid_handles += 1,
        }
    }

    fn create_diffuse_material(&self, albedo: [f64; 3]) -> *mut c_void {
        self.create_material(MaterialParams::Diffuse {
            albedo: Rgb::from(albedo),
        })
    }

    fn create_reflective_material(&self, albedo: [f64; 3], fuzz: f64) -> *mut c_void {
        self.create_material(MaterialParams::Reflective {
            albedo: Rgb::from(albedo),
            fuzz,
        })
    }

    fn create_refractive_material(&self, refraction_index: f64) -> *mut c_void {
        self.create_material(MaterialParams::Refractive { refraction_index })
    }

    unsafe fn destroy_material(&self, material: NonNull<c_void>) {
        let mut state = self.lock();
        if state.materials.remove(&material.as_ptr().addr()).is_some() {
            state.stats.materials_destroyed += 1;
        } else {
            state.stats.invalid_handles += 1;
            tracing::warn!(addr = ?material, "destroy of unknown material");
        }
    }

    unsafe fn render_scene(
        &self,
        scene: NonNull<c_void>,
        config: CameraConfig,
        out_pixels: NonNull<u8>,
        progress: ProgressCallback,
    ) {
        // The lock is released before any callback so a progress handler may
        // call back into the engine.
        let (fault, stride) = {
            let mut state = self.lock();
            state.stats.renders += 1;
            if !state.scenes.contains_key(&scene.as_ptr().addr()) {
                state.stats.invalid_handles += 1;
                return;
            }
            (state.progress_fault, state.progress_stride)
        };

        let width = config.image_width.max(1) as usize;
        let height = (f64::from(config.image_width) / config.aspect_ratio)
            .floor()
            .max(1.0) as usize;
        let samples = config.samples_per_pixel.max(1);
        let stride = stride.unwrap_or((samples / 10).max(1));

        let notify = |samples: c_int, buffer: NonNull<u8>| {
            self.lock().stats.progress_notifications += 1;
            progress(samples, buffer.as_ptr());
        };

        let mut done = 0;
        let mut first = true;
        while done < samples {
            done = done.saturating_add(stride).min(samples);
            // SAFETY: the caller guarantees the buffer holds width * height * 4 bytes.
            unsafe { fill_gradient(out_pixels, width, height, done, samples) };

            match fault {
                Some(ProgressFault::ForeignBuffer) if first => {
                    // SAFETY: the address is only reported, never dereferenced.
                    let foreign = unsafe { out_pixels.add(4) };
                    notify(done, foreign);
                }
                Some(ProgressFault::SampleRegression) if first => {
                    notify(done, out_pixels);
                    notify(done - 1, out_pixels);
                }
                _ => notify(done, out_pixels),
            }
            first = false;
        }
        if fault == Some(ProgressFault::SampleOverflow) {
            notify(samples + 1, out_pixels);
        }
    }

    unsafe fn save_pixels(
        &self,
        path: &CStr,
        width: i32,
        height: i32,
        pixels: NonNull<u8>,
    ) -> c_int {
        let (forced, convention) = {
            let mut state = self.lock();
            state.stats.saves += 1;
            (state.save_status, state.save_convention)
        };
        if let Some(status) = forced {
            return status;
        }
        if width <= 0 || height <= 0 {
            return convention.status(false);
        }
        let len = width as usize * height as usize * 4;
        // SAFETY: the caller guarantees `pixels` is readable for len bytes.
        let data = unsafe { std::slice::from_raw_parts(pixels.as_ptr(), len) };
        match write_pam(path, width, height, data) {
            Ok(()) => convention.status(true),
            Err(e) => {
                tracing::warn!("debug engine failed to write {path:?}: {e}");
                convention.status(false)
            }
        }
    }

    fn save_convention(&self) -> SaveConvention {
        self.lock().save_convention
    }
}

/// Write a gradient: red across, green down, blue by progress, opaque alpha.
///
/// # Safety
/// `out` is valid for writes of `width * height * 4` bytes.
unsafe fn fill_gradient(out: NonNull<u8>, width: usize, height: usize, done: i32, total: i32) {
    // SAFETY: forwarded from the caller; the slice does not outlive this call.
    let pixels = unsafe { std::slice::from_raw_parts_mut(out.as_ptr(), width * height * 4) };
    let blue = (i64::from(done) * 255 / i64::from(total.max(1))) as u8;
    let x_span = (width - 1).max(1);
    let y_span = (height - 1).max(1);
    for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % width, i / width);
        px[0] = (x * 255 / x_span) as u8;
        px[1] = (y * 255 / y_span) as u8;
        px[2] = blue;
        px[3] = 255;
    }
}

fn write_pam(path: &CStr, width: i32, height: i32, data: &[u8]) -> std::io::Result<()> {
    let path = path
        .to_str()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write!(
        file,
        "P7\nWIDTH {width}\nHEIGHT {height}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n"
    )?;
    file.write_all(data)?;
    file.flush()
}
