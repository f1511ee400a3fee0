use serde::{Deserialize, Serialize};

/// A value rejected before it could reach the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument `{name}`: {reason}")]
pub struct InvalidArgument {
    pub name: &'static str,
    pub reason: String,
}

impl InvalidArgument {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }
}

/// Linear reflectance per channel, nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[f64; 3]> for Rgb {
    fn from([r, g, b]: [f64; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgb> for [f64; 3] {
    fn from(c: Rgb) -> Self {
        c.to_array()
    }
}

/// Surface response of a material, one variant per engine constructor.
///
/// Parameters are forwarded as-is; physical ranges (fuzz in `[0, 1]`,
/// positive refraction index) are the engine's concern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaterialParams {
    /// Lambertian scattering.
    Diffuse { albedo: Rgb },
    /// Metal-like reflection, blurred by `fuzz`.
    Reflective { albedo: Rgb, fuzz: f64 },
    /// Dielectric such as glass or water.
    Refractive { refraction_index: f64 },
}

impl MaterialParams {
    /// Short name of the variant, used in logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Diffuse { .. } => "diffuse",
            Self::Reflective { .. } => "reflective",
            Self::Refractive { .. } => "refractive",
        }
    }
}
