use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::types::InvalidArgument;

/// Widest image the engine can address: it computes the row stride
/// `width * 4` as a signed 32-bit value.
pub const MAX_IMAGE_WIDTH: u32 = (i32::MAX / 4) as u32;

/// Camera and image configuration for one render.
///
/// A pure value: it carries no engine state and can be validated, copied,
/// and serialized freely. `validate()` must succeed before the camera is
/// mapped to the native layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    /// Width divided by height.
    pub aspect_ratio: f64,
    /// Image width in pixels.
    pub image_width: u32,
    /// Stochastic passes averaged per pixel.
    pub samples_per_pixel: u32,
    /// Maximum number of ray bounces.
    pub max_depth: u32,
    /// Vertical field of view in degrees.
    pub vertical_fov: f64,
    pub look_from: DVec3,
    pub look_at: DVec3,
    pub up: DVec3,
    /// Cone angle of the defocus blur in degrees; 0 disables depth of field.
    pub defocus_angle: f64,
    /// Distance from `look_from` to the plane of perfect focus.
    pub focus_distance: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            aspect_ratio: 3.0 / 2.0,
            image_width: 800,
            samples_per_pixel: 100,
            max_depth: 50,
            vertical_fov: 20.0,
            look_from: DVec3::new(13.0, 2.0, 3.0),
            look_at: DVec3::ZERO,
            up: DVec3::Y,
            defocus_angle: 0.6,
            focus_distance: 10.0,
        }
    }
}

impl Camera {
    /// Image height derived from width and aspect ratio, `floor(width / aspect)`.
    ///
    /// Returns 0 when the ratio does not produce at least one row.
    pub fn image_height(&self) -> u32 {
        let height = (f64::from(self.image_width) / self.aspect_ratio).floor();
        if height.is_finite() && height >= 1.0 {
            height.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }

    /// Size in bytes of the 4-channel output buffer, `width * height * 4`.
    pub fn pixel_buffer_len(&self) -> Option<usize> {
        (self.image_width as usize)
            .checked_mul(self.image_height() as usize)?
            .checked_mul(4)
    }

    /// Check every field the engine divides by or loops over.
    ///
    /// Integer fields must also fit the engine's signed 32-bit slots, and the
    /// row stride `image_width * 4` must fit one too.
    pub fn validate(&self) -> Result<(), InvalidArgument> {
        positive_f64("aspect_ratio", self.aspect_ratio)?;
        positive_i32("image_width", self.image_width)?;
        if self.image_width > MAX_IMAGE_WIDTH {
            return Err(InvalidArgument::new(
                "image_width",
                format!("exceeds {MAX_IMAGE_WIDTH}, the widest row the engine can address"),
            ));
        }
        positive_i32("samples_per_pixel", self.samples_per_pixel)?;
        positive_i32("max_depth", self.max_depth)?;
        positive_f64("vertical_fov", self.vertical_fov)?;
        positive_f64("focus_distance", self.focus_distance)?;
        let height = self.image_height();
        if height == 0 {
            return Err(InvalidArgument::new(
                "image_height",
                format!(
                    "width {} at aspect ratio {} yields no rows",
                    self.image_width, self.aspect_ratio
                ),
            ));
        }
        if i32::try_from(height).is_err() {
            return Err(InvalidArgument::new("image_height", "exceeds i32::MAX"));
        }
        if self.pixel_buffer_len().is_none() {
            return Err(InvalidArgument::new(
                "image_width",
                "pixel buffer size overflows usize",
            ));
        }
        Ok(())
    }
}

// NaN fails the comparison and is rejected with the rest.
fn positive_f64(name: &'static str, value: f64) -> Result<(), InvalidArgument> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(InvalidArgument::new(name, "must be > 0"))
    }
}

fn positive_i32(name: &'static str, value: u32) -> Result<(), InvalidArgument> {
    if value == 0 {
        return Err(InvalidArgument::new(name, "must be > 0"));
    }
    if i32::try_from(value).is_err() {
        return Err(InvalidArgument::new(name, "exceeds i32::MAX"));
    }
    Ok(())
}
