//! Scene description files.
//!
//! A description names its materials once and lets spheres refer to them by
//! name, mirroring how the engine shares one material among many spheres.
//! YAML and JSON are accepted, chosen by file extension.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::camera::Camera;
use crate::types::{InvalidArgument, MaterialParams, Rgb};

/// Errors from loading or validating a scene description.
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported scene file extension: {0:?}")]
    UnsupportedFormat(String),
    #[error("sphere {index} references unknown material `{material}`")]
    UnknownMaterial { index: usize, material: String },
    #[error(transparent)]
    Invalid(#[from] InvalidArgument),
}

/// One sphere, referencing a material by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereDescription {
    pub center: DVec3,
    pub radius: f64,
    pub material: String,
}

/// Camera, named materials, and spheres making up one render job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialParams>,
    #[serde(default)]
    pub spheres: Vec<SphereDescription>,
}

impl SceneDescription {
    /// Load and validate a description from a `.yaml`, `.yml`, or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DescriptionError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let text = match ext.as_str() {
            "yaml" | "yml" | "json" => std::fs::read_to_string(path)?,
            _ => return Err(DescriptionError::UnsupportedFormat(ext)),
        };
        if ext == "json" {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DescriptionError> {
        let desc: Self = serde_yaml::from_str(text)?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DescriptionError> {
        let desc: Self = serde_json::from_str(text)?;
        desc.validate()?;
        Ok(desc)
    }

    /// Check the camera and that every sphere names a declared material.
    pub fn validate(&self) -> Result<(), DescriptionError> {
        self.camera.validate()?;
        for (index, sphere) in self.spheres.iter().enumerate() {
            if !self.materials.contains_key(&sphere.material) {
                return Err(DescriptionError::UnknownMaterial {
                    index,
                    material: sphere.material.clone(),
                });
            }
        }
        Ok(())
    }

    /// The four-sphere demo: a huge diffuse ground, and a glass, a diffuse,
    /// and a metal sphere side by side.
    pub fn demo() -> Self {
        let materials = BTreeMap::from([
            (
                "ground".to_string(),
                MaterialParams::Diffuse {
                    albedo: Rgb::new(0.5, 0.5, 0.5),
                },
            ),
            (
                "glass".to_string(),
                MaterialParams::Refractive {
                    refraction_index: 1.5,
                },
            ),
            (
                "center".to_string(),
                MaterialParams::Diffuse {
                    albedo: Rgb::new(0.4, 0.2, 0.1),
                },
            ),
            (
                "right".to_string(),
                MaterialParams::Reflective {
                    albedo: Rgb::new(0.7, 0.6, 0.5),
                    fuzz: 0.0,
                },
            ),
        ]);
        let sphere = |x: f64, y: f64, radius: f64, material: &str| SphereDescription {
            center: DVec3::new(x, y, 0.0),
            radius,
            material: material.to_string(),
        };
        Self {
            camera: Camera::default(),
            materials,
            spheres: vec![
                sphere(0.0, -1000.0, 1000.0, "ground"),
                sphere(0.0, 1.0, 1.0, "glass"),
                sphere(-4.0, 1.0, 1.0, "center"),
                sphere(4.0, 1.0, 1.0, "right"),
            ],
        }
    }
}
