use raybridge_common::{MaterialParams, SceneDescription};
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::BridgeError;
use crate::handle::NativeHandle;

fn destroy_material(engine: &dyn Engine, raw: NonNull<c_void>) {
    // SAFETY: NativeHandle calls this once, with the address create_* returned.
    unsafe { engine.destroy_material(raw) }
}

/// An engine-side material: diffuse, reflective, or refractive.
///
/// Owns one engine allocation, freed by `dispose()` or on drop. Scenes
/// borrow materials; the borrow checker keeps a material alive for as long
/// as any scene that references it.
#[derive(Debug)]
pub struct Material {
    params: MaterialParams,
    handle: NativeHandle,
}

impl Material {
    /// One constructor call, chosen by variant.
    pub(crate) fn create(
        engine: &Arc<dyn Engine>,
        params: MaterialParams,
    ) -> Result<Self, BridgeError> {
        let handle = NativeHandle::acquire(
            engine,
            "material",
            |engine| match params {
                MaterialParams::Diffuse { albedo } => {
                    engine.create_diffuse_material(albedo.to_array())
                }
                MaterialParams::Reflective { albedo, fuzz } => {
                    engine.create_reflective_material(albedo.to_array(), fuzz)
                }
                MaterialParams::Refractive { refraction_index } => {
                    engine.create_refractive_material(refraction_index)
                }
            },
            destroy_material,
        )?;
        Ok(Self { params, handle })
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    pub fn kind(&self) -> &'static str {
        self.params.kind()
    }

    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    /// Free the engine allocation. Calling it again does nothing.
    pub fn dispose(&mut self) {
        self.handle.release();
    }

    pub(crate) fn raw(&self) -> Result<NonNull<c_void>, BridgeError> {
        self.handle
            .raw()
            .map_err(|_| BridgeError::UseAfterDispose {
                resource: "material",
            })
    }

    pub(crate) fn belongs_to(&self, engine: &Arc<dyn Engine>) -> bool {
        self.handle.belongs_to(engine)
    }
}

/// Materials created from a scene description, addressed by name.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    materials: BTreeMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every material the description declares.
    ///
    /// On failure the materials created so far are released.
    pub(crate) fn from_description(
        engine: &Arc<dyn Engine>,
        description: &SceneDescription,
    ) -> Result<Self, BridgeError> {
        let mut library = Self::new();
        for (name, params) in &description.materials {
            library.insert(name.clone(), Material::create(engine, *params)?);
        }
        Ok(library)
    }

    /// Add a material, returning any previous one under the same name.
    pub fn insert(&mut self, name: impl Into<String>, material: Material) -> Option<Material> {
        self.materials.insert(name.into(), material)
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bridge, DebugEngine};
    use raybridge_common::Rgb;

    fn setup() -> (Arc<DebugEngine>, Bridge) {
        let debug = Arc::new(DebugEngine::new());
        let bridge = Bridge::new(debug.clone());
        (debug, bridge)
    }

    #[test]
    fn each_constructor_allocates_once() {
        let (debug, bridge) = setup();
        let diffuse = bridge.create_diffuse(Rgb::new(0.5, 0.5, 0.5)).unwrap();
        let reflective = bridge.create_reflective(Rgb::new(0.7, 0.6, 0.5), 0.0).unwrap();
        let refractive = bridge.create_refractive(1.5).unwrap();

        assert_eq!(debug.stats().materials_created, 3);
        assert_eq!(debug.live_materials(), 3);
        assert_eq!(diffuse.kind(), "diffuse");
        assert_eq!(reflective.kind(), "reflective");
        assert_eq!(refractive.kind(), "refractive");
    }

    #[test]
    fn parameters_reach_the_engine_unchanged() {
        let (debug, bridge) = setup();
        let params = MaterialParams::Reflective {
            albedo: Rgb::new(0.1, 0.2, 0.3),
            fuzz: 4.0,
        };
        let material = bridge.create_material(params).unwrap();
        assert_eq!(debug.material_params(material.raw().unwrap()), Some(params));
    }

    #[test]
    fn out_of_range_parameters_are_forwarded() {
        let (debug, bridge) = setup();
        let material = bridge.create_refractive(-1.0).unwrap();
        assert_eq!(
            debug.material_params(material.raw().unwrap()),
            Some(MaterialParams::Refractive {
                refraction_index: -1.0
            })
        );
    }

    #[test]
    fn dispose_is_idempotent() {
        let (debug, bridge) = setup();
        let mut material = bridge.create_refractive(1.5).unwrap();
        material.dispose();
        material.dispose();
        assert!(material.is_disposed());
        drop(material);

        let stats = debug.stats();
        assert_eq!(stats.materials_destroyed, 1);
        assert_eq!(stats.invalid_handles, 0);
    }

    #[test]
    fn disposed_material_reports_use_after_dispose() {
        let (_debug, bridge) = setup();
        let mut material = bridge.create_diffuse(Rgb::new(1.0, 1.0, 1.0)).unwrap();
        material.dispose();
        assert!(matches!(
            material.raw(),
            Err(BridgeError::UseAfterDispose {
                resource: "material"
            })
        ));
    }

    #[test]
    fn drop_releases_material() {
        let (debug, bridge) = setup();
        drop(bridge.create_diffuse(Rgb::new(0.5, 0.5, 0.5)).unwrap());
        assert_eq!(debug.live_materials(), 0);
        assert_eq!(debug.stats().materials_destroyed, 1);
    }

    #[test]
    fn failed_allocation_is_construction_failure() {
        let (debug, bridge) = setup();
        debug.set_fail_allocations(true);
        assert!(matches!(
            bridge.create_refractive(1.5),
            Err(BridgeError::ConstructionFailure {
                resource: "material"
            })
        ));
    }

    #[test]
    fn library_from_demo_description() {
        let (debug, bridge) = setup();
        let library = bridge
            .create_materials(&SceneDescription::demo())
            .unwrap();
        assert_eq!(library.len(), 4);
        assert_eq!(library.get("glass").unwrap().kind(), "refractive");
        assert!(library.get("chrome").is_none());
        assert_eq!(
            library.names().collect::<Vec<_>>(),
            ["center", "glass", "ground", "right"]
        );
        drop(library);
        assert_eq!(debug.live_materials(), 0);
    }

    #[test]
    fn library_failure_releases_partial_work() {
        let (debug, bridge) = setup();
        debug.set_allocation_budget(Some(2));
        let result = bridge.create_materials(&SceneDescription::demo());
        assert!(matches!(
            result,
            Err(BridgeError::ConstructionFailure { .. })
        ));
        let stats = debug.stats();
        assert_eq!(stats.materials_created, 2);
        assert_eq!(stats.materials_destroyed, 2);
        assert_eq!(debug.live_materials(), 0);
    }
}
