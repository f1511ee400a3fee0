//! The blocking render call.
//!
//! The engine writes into the output buffer by address for the whole call and
//! reports progress through a bare C function pointer with no user data. Two
//! pieces make that safe:
//!
//! - `PinnedBuffer` owns the allocation as a raw pointer from before the call
//!   until after it returns, so nothing can move, grow, or free it in between.
//!   Dropping it frees the memory on every exit path.
//! - `relay_progress` is the C callback. It finds the current render's state
//!   through a thread-local slot (notifications arrive on the calling thread),
//!   checks each notification, and hands the host a read-only view of the
//!   pinned buffer.
//!
//! # Invariants
//! - Every address reported to the host handler is the pinned buffer's.
//! - Sample counts seen by the handler never decrease and never exceed the
//!   camera's samples per pixel.
//! - A panic in the handler never unwinds through the engine.

use raybridge_common::Camera;
use std::any::Any;
use std::cell::Cell;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::Engine;
use crate::error::BridgeError;
use crate::layout::to_native_layout;
use crate::scene::Scene;

/// A finished image: `width * height * 4` bytes, 4 interleaved 8-bit
/// channels per pixel, in the engine's channel order and row orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.pixels.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.pixels
    }
}

/// One progress notification, as delivered to the host.
///
/// `pixels` is the buffer the engine is rendering into, observed between two
/// of its writes. It is only valid inside the handler.
#[derive(Debug, Clone, Copy)]
pub struct RenderProgress<'a> {
    pub samples_completed: u32,
    pub samples_per_pixel: u32,
    pub pixels: &'a [u8],
}

impl RenderProgress<'_> {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        f64::from(self.samples_completed) / f64::from(self.samples_per_pixel.max(1))
    }

    /// The address of the buffer being rendered.
    pub fn buffer_addr(&self) -> *const u8 {
        self.pixels.as_ptr()
    }
}

/// Heap buffer lent to the engine by address.
struct PinnedBuffer {
    slice: NonNull<[u8]>,
}

impl PinnedBuffer {
    fn zeroed(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        Self {
            slice: NonNull::from(Box::leak(boxed)),
        }
    }

    fn addr(&self) -> NonNull<u8> {
        self.slice.cast()
    }

    fn len(&self) -> usize {
        self.slice.len()
    }

    /// End the lend and take the buffer back without copying.
    fn into_vec(self) -> Vec<u8> {
        let slice = self.slice;
        std::mem::forget(self);
        // SAFETY: `slice` came from Box::leak in `zeroed` and is reclaimed once.
        unsafe { Box::from_raw(slice.as_ptr()) }.into_vec()
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        // SAFETY: as in `into_vec`; that path forgets `self` instead of dropping.
        drop(unsafe { Box::from_raw(self.slice.as_ptr()) });
    }
}

type ProgressHandler<'h> = &'h mut dyn FnMut(RenderProgress<'_>);

/// Per-render state reachable from the C callback.
struct Relay<'h> {
    buffer: NonNull<u8>,
    len: usize,
    samples_per_pixel: c_int,
    last_samples: c_int,
    delivered: usize,
    violation: Option<String>,
    panic: Option<Box<dyn Any + Send>>,
    handler: Option<ProgressHandler<'h>>,
}

impl<'h> Relay<'h> {
    fn new(buffer: &PinnedBuffer, samples_per_pixel: c_int, handler: Option<ProgressHandler<'h>>) -> Self {
        Self {
            buffer: buffer.addr(),
            len: buffer.len(),
            samples_per_pixel,
            last_samples: 0,
            delivered: 0,
            violation: None,
            panic: None,
            handler,
        }
    }

    fn notify(&mut self, samples: c_int, buffer: *mut u8) {
        if self.violation.is_some() || self.panic.is_some() {
            return;
        }
        if buffer != self.buffer.as_ptr() {
            self.violate(format!(
                "progress reported buffer {buffer:p}, expected {:p}",
                self.buffer
            ));
            return;
        }
        if samples < self.last_samples {
            self.violate(format!(
                "sample count went backwards from {} to {samples}",
                self.last_samples
            ));
            return;
        }
        if samples > self.samples_per_pixel {
            self.violate(format!(
                "sample count {samples} exceeds samples per pixel {}",
                self.samples_per_pixel
            ));
            return;
        }
        self.last_samples = samples;
        self.delivered += 1;
        tracing::trace!(samples, "render progress");

        let Some(handler) = self.handler.as_deref_mut() else {
            return;
        };
        // SAFETY: the engine is suspended inside this callback, so nothing
        // writes the buffer while the view exists, and the view cannot escape
        // the handler.
        let pixels = unsafe { std::slice::from_raw_parts(self.buffer.as_ptr(), self.len) };
        let progress = RenderProgress {
            samples_completed: samples.unsigned_abs(),
            samples_per_pixel: self.samples_per_pixel.unsigned_abs(),
            pixels,
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(progress))) {
            tracing::warn!("progress handler panicked; ignoring further notifications");
            self.panic = Some(payload);
        }
    }

    fn violate(&mut self, detail: String) {
        tracing::warn!(%detail, "engine broke the progress contract");
        self.violation = Some(detail);
    }
}

thread_local! {
    static ACTIVE_RELAY: Cell<*mut c_void> = const { Cell::new(std::ptr::null_mut()) };
}

/// Makes a relay current on this thread until dropped, then restores
/// whichever relay was current before (renders may nest inside handlers).
struct RelayScope {
    previous: *mut c_void,
}

impl RelayScope {
    fn install(relay: &mut Relay<'_>) -> Self {
        let ptr = (relay as *mut Relay<'_>).cast::<c_void>();
        let previous = ACTIVE_RELAY.with(|slot| slot.replace(ptr));
        Self { previous }
    }
}

impl Drop for RelayScope {
    fn drop(&mut self) {
        ACTIVE_RELAY.with(|slot| slot.set(self.previous));
    }
}

extern "C" fn relay_progress(samples: c_int, buffer: *mut u8) {
    let ptr = ACTIVE_RELAY.with(Cell::get);
    if ptr.is_null() {
        tracing::warn!(samples, "progress callback outside of a render; ignored");
        return;
    }
    // SAFETY: only RelayScope writes the slot, and it points at a relay that
    // lives on this thread's stack until the engine call returns.
    let relay = unsafe { &mut *ptr.cast::<Relay<'_>>() };
    relay.notify(samples, buffer);
}

/// Validate, pin, call, unpin.
pub(crate) fn render(
    engine: &Arc<dyn Engine>,
    scene: &Scene<'_>,
    camera: &Camera,
    handler: Option<ProgressHandler<'_>>,
) -> Result<PixelBuffer, BridgeError> {
    camera.validate()?;
    let scene_raw = scene.raw()?;
    if !scene.belongs_to(engine) {
        return Err(BridgeError::invalid(
            "scene",
            "created by a different engine than the bridge",
        ));
    }
    let width = camera.image_width;
    let height = camera.image_height();
    let len = camera
        .pixel_buffer_len()
        .ok_or_else(|| BridgeError::invalid("image_width", "pixel buffer size overflows usize"))?;
    let config = to_native_layout(camera);

    let buffer = PinnedBuffer::zeroed(len);
    let mut relay = Relay::new(&buffer, config.samples_per_pixel, handler);

    let _span = tracing::info_span!(
        "render",
        engine = engine.name(),
        width,
        height,
        samples = camera.samples_per_pixel,
        spheres = scene.len()
    )
    .entered();
    let started = Instant::now();
    {
        let _scope = RelayScope::install(&mut relay);
        // SAFETY: the scene is live and borrows its materials, so they are
        // live too; the buffer holds exactly the bytes the engine derives from
        // `config` and stays pinned until `into_vec` below.
        unsafe { engine.render_scene(scene_raw, config, buffer.addr(), relay_progress) };
    }

    if let Some(payload) = relay.panic.take() {
        panic::resume_unwind(payload);
    }
    if let Some(detail) = relay.violation.take() {
        return Err(BridgeError::NativeCallFailure {
            call: "render_scene",
            detail,
        });
    }
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        notifications = relay.delivered,
        "render finished"
    );
    Ok(PixelBuffer {
        width,
        height,
        pixels: buffer.into_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bridge, DebugEngine, ProgressFault};
    use glam::DVec3;
    use raybridge_common::Rgb;

    fn setup() -> (Arc<DebugEngine>, Bridge) {
        let debug = Arc::new(DebugEngine::new().with_progress_stride(1));
        let bridge = Bridge::new(debug.clone());
        (debug, bridge)
    }

    fn small_camera(samples: u32) -> Camera {
        Camera {
            aspect_ratio: 2.0,
            image_width: 8,
            samples_per_pixel: samples,
            ..Camera::default()
        }
    }

    #[test]
    fn buffer_has_exact_size() {
        let (_debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let image = bridge.render(&scene, &small_camera(2)).unwrap();
        assert_eq!(image.width(), 8);
        assert_eq!(image.height(), 4);
        assert_eq!(image.len(), 8 * 4 * 4);
        assert!(image.as_bytes().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let (debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let mut seen = Vec::new();
        bridge
            .render_with_progress(&scene, &small_camera(5), |p| {
                assert_eq!(p.samples_per_pixel, 5);
                seen.push(p.samples_completed);
            })
            .unwrap();
        assert_eq!(seen, [1, 2, 3, 4, 5]);
        assert_eq!(debug.stats().progress_notifications, 5);
    }

    #[test]
    fn progress_sees_the_returned_buffer() {
        let (_debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let mut addrs = Vec::new();
        let mut lens = Vec::new();
        let image = bridge
            .render_with_progress(&scene, &small_camera(3), |p| {
                addrs.push(p.buffer_addr());
                lens.push(p.pixels.len());
            })
            .unwrap();
        assert_eq!(addrs.len(), 3);
        assert!(addrs.iter().all(|&a| a == image.as_ptr()));
        assert!(lens.iter().all(|&l| l == image.len()));
    }

    #[test]
    fn progress_view_shows_partial_image() {
        let (_debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let mut blues = Vec::new();
        bridge
            .render_with_progress(&scene, &small_camera(2), |p| blues.push(p.pixels[2]))
            .unwrap();
        // Debug engine: blue tracks completed samples.
        assert_eq!(blues, [127, 255]);
    }

    #[test]
    fn invalid_camera_never_reaches_engine() {
        let (debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let camera = Camera {
            image_width: 0,
            ..small_camera(1)
        };
        let err = bridge.render(&scene, &camera).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref e) if e.name == "image_width"));
        assert_eq!(debug.stats().renders, 0);
    }

    #[test]
    fn disposed_scene_cannot_render() {
        let (debug, bridge) = setup();
        let mut scene = bridge.create_scene().unwrap();
        scene.dispose();
        assert!(matches!(
            bridge.render(&scene, &small_camera(1)),
            Err(BridgeError::UseAfterDispose { resource: "scene" })
        ));
        assert_eq!(debug.stats().renders, 0);
    }

    #[test]
    fn scene_from_other_engine_is_rejected() {
        let (_debug, bridge) = setup();
        let (_other_debug, other) = setup();
        let scene = other.create_scene().unwrap();
        let err = bridge.render(&scene, &small_camera(1)).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref e) if e.name == "scene"));
    }

    #[test]
    fn foreign_buffer_address_fails_render() {
        let (debug, bridge) = setup();
        debug.set_progress_fault(Some(ProgressFault::ForeignBuffer));
        let scene = bridge.create_scene().unwrap();
        let mut calls = 0;
        let err = bridge
            .render_with_progress(&scene, &small_camera(3), |_| calls += 1)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NativeCallFailure {
                call: "render_scene",
                ..
            }
        ));
        assert_eq!(calls, 0);
    }

    #[test]
    fn regressing_samples_fail_render() {
        let (debug, bridge) = setup();
        debug.set_progress_fault(Some(ProgressFault::SampleRegression));
        let scene = bridge.create_scene().unwrap();
        let mut seen = Vec::new();
        let err = bridge
            .render_with_progress(&scene, &small_camera(3), |p| seen.push(p.samples_completed))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NativeCallFailure { .. }));
        assert_eq!(seen, [1]);
    }

    #[test]
    fn overflowing_samples_fail_render() {
        let (debug, bridge) = setup();
        debug.set_progress_fault(Some(ProgressFault::SampleOverflow));
        let scene = bridge.create_scene().unwrap();
        let mut seen = Vec::new();
        let err = bridge
            .render_with_progress(&scene, &small_camera(2), |p| seen.push(p.samples_completed))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NativeCallFailure { .. }));
        assert_eq!(seen, [1, 2]);
    }

    #[test]
    fn handler_panic_resumes_after_call() {
        let (debug, bridge) = setup();
        let scene = bridge.create_scene().unwrap();
        let mut calls = 0;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            bridge.render_with_progress(&scene, &small_camera(4), |_| {
                calls += 1;
                panic!("handler failure");
            })
        }));
        assert!(result.is_err());
        assert_eq!(calls, 1);
        // The engine ran to completion and the slot was cleared.
        assert_eq!(debug.stats().progress_notifications, 4);
        assert!(ACTIVE_RELAY.with(Cell::get).is_null());
    }

    #[test]
    fn nested_render_restores_outer_relay() {
        let (_debug, bridge) = setup();
        let outer_scene = bridge.create_scene().unwrap();
        let inner_scene = bridge.create_scene().unwrap();
        let mut outer_seen = Vec::new();
        let mut inner_lens = Vec::new();
        let image = bridge
            .render_with_progress(&outer_scene, &small_camera(3), |p| {
                outer_seen.push(p.samples_completed);
                if p.samples_completed == 1 {
                    let inner = bridge.render(&inner_scene, &small_camera(2)).unwrap();
                    inner_lens.push(inner.len());
                }
            })
            .unwrap();
        assert_eq!(outer_seen, [1, 2, 3]);
        assert_eq!(inner_lens, [image.len()]);
        assert!(ACTIVE_RELAY.with(Cell::get).is_null());
    }

    #[test]
    fn stray_callback_is_ignored() {
        relay_progress(1, std::ptr::null_mut());
        assert!(ACTIVE_RELAY.with(Cell::get).is_null());
    }

    #[test]
    fn demo_scenario_buffer_length() {
        let (debug, bridge) = setup();
        let ground = bridge.create_diffuse(Rgb::new(0.5, 0.5, 0.5)).unwrap();
        let glass = bridge.create_refractive(1.5).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene
            .add_sphere(DVec3::new(0.0, -1000.0, 0.0), 1000.0, &ground)
            .unwrap();
        scene.add_sphere(DVec3::new(0.0, 1.0, 0.0), 1.0, &glass).unwrap();

        let camera = Camera {
            aspect_ratio: 1.5,
            image_width: 800,
            samples_per_pixel: 2,
            ..Camera::default()
        };
        assert_eq!(camera.image_height(), 533);
        let image = bridge.render(&scene, &camera).unwrap();
        assert_eq!(image.len(), 1_705_600);

        debug.set_save_status(Some(1));
        let tmp = tempfile::tempdir().unwrap();
        let err = bridge
            .save_buffer(tmp.path().join("out.png"), &image)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NativeCallFailure {
                call: "save_pixels",
                ..
            }
        ));
    }
}
