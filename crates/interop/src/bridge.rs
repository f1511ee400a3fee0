use raybridge_common::{Camera, MaterialParams, Rgb, SceneDescription};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::BridgeError;
use crate::material::{Material, MaterialLibrary};
use crate::render::{self, PixelBuffer, RenderProgress};
use crate::scene::Scene;

/// Entry point for talking to one engine.
///
/// Every resource created through a bridge remembers its engine, and is
/// rejected by operations on any other bridge. Cloning shares the engine.
#[derive(Clone)]
pub struct Bridge {
    engine: Arc<dyn Engine>,
}

impl Bridge {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        tracing::debug!(engine = engine.name(), "bridge created");
        Self { engine }
    }

    /// A bridge to the linked engine library.
    #[cfg(feature = "native")]
    pub fn native() -> Self {
        Self::new(Arc::new(crate::NativeEngine::new()))
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn create_scene<'m>(&self) -> Result<Scene<'m>, BridgeError> {
        Scene::create(&self.engine)
    }

    pub fn create_material(&self, params: MaterialParams) -> Result<Material, BridgeError> {
        Material::create(&self.engine, params)
    }

    pub fn create_diffuse(&self, albedo: Rgb) -> Result<Material, BridgeError> {
        self.create_material(MaterialParams::Diffuse { albedo })
    }

    pub fn create_reflective(&self, albedo: Rgb, fuzz: f64) -> Result<Material, BridgeError> {
        self.create_material(MaterialParams::Reflective { albedo, fuzz })
    }

    pub fn create_refractive(&self, refraction_index: f64) -> Result<Material, BridgeError> {
        self.create_material(MaterialParams::Refractive { refraction_index })
    }

    /// Create every material a description declares, keyed by name.
    pub fn create_materials(
        &self,
        description: &SceneDescription,
    ) -> Result<MaterialLibrary, BridgeError> {
        MaterialLibrary::from_description(&self.engine, description)
    }

    /// Render `scene` as seen by `camera`. Blocks until the engine returns.
    pub fn render(&self, scene: &Scene<'_>, camera: &Camera) -> Result<PixelBuffer, BridgeError> {
        render::render(&self.engine, scene, camera, None)
    }

    /// Like [`Bridge::render`], calling `on_progress` on this thread for
    /// every progress notification the engine makes.
    ///
    /// A panic in `on_progress` stops further notifications and is resumed
    /// once the engine call has returned.
    pub fn render_with_progress(
        &self,
        scene: &Scene<'_>,
        camera: &Camera,
        mut on_progress: impl FnMut(RenderProgress<'_>),
    ) -> Result<PixelBuffer, BridgeError> {
        render::render(&self.engine, scene, camera, Some(&mut on_progress))
    }

    /// Encode a `width * height * 4` byte buffer to `path`.
    pub fn save_png(
        &self,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), BridgeError> {
        crate::image::save_png(&self.engine, path.as_ref(), width, height, pixels)
    }

    pub fn save_buffer(
        &self,
        path: impl AsRef<Path>,
        image: &PixelBuffer,
    ) -> Result<(), BridgeError> {
        self.save_png(path, image.width(), image.height(), image.as_bytes())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("engine", &self.engine.name())
            .finish()
    }
}
