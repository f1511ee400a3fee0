//! Camera to C struct mapping.

use raybridge_common::Camera;
use raybridge_sys::CameraConfig;

/// Lay a camera out exactly as the engine reads it.
///
/// Infallible: the camera must already have passed `Camera::validate()`,
/// which guarantees every integer fits its `i32` slot. Debug builds assert it.
pub fn to_native_layout(camera: &Camera) -> CameraConfig {
    debug_assert!(
        camera.validate().is_ok(),
        "to_native_layout called with an invalid camera: {camera:?}"
    );
    CameraConfig {
        aspect_ratio: camera.aspect_ratio,
        image_width: saturating_i32(camera.image_width),
        samples_per_pixel: saturating_i32(camera.samples_per_pixel),
        max_depth: saturating_i32(camera.max_depth),
        _padding: 0,
        vertical_fov: camera.vertical_fov,
        look_from: camera.look_from.to_array(),
        look_at: camera.look_at.to_array(),
        up: camera.up.to_array(),
        defocus_angle: camera.defocus_angle,
        focus_distance: camera.focus_distance,
    }
}

fn saturating_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
