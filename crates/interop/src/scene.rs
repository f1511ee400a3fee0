use glam::DVec3;
use raybridge_common::SphereDescription;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::BridgeError;
use crate::handle::NativeHandle;
use crate::material::{Material, MaterialLibrary};

fn destroy_scene(engine: &dyn Engine, raw: NonNull<c_void>) {
    // SAFETY: NativeHandle calls this once, with the address create_scene returned.
    unsafe { engine.destroy_scene(raw) }
}

/// An engine-side collection of spheres.
///
/// Each sphere borrows its material for `'m`: the engine keeps only the
/// material's address, so every material added must outlive the scene's
/// last use. The scene owns its accumulator and frees it on `dispose()` or
/// drop.
#[derive(Debug)]
pub struct Scene<'m> {
    handle: NativeHandle,
    len: usize,
    _materials: PhantomData<&'m Material>,
}

impl<'m> Scene<'m> {
    pub(crate) fn create(engine: &Arc<dyn Engine>) -> Result<Self, BridgeError> {
        let handle = NativeHandle::acquire(engine, "scene", |e| e.create_scene(), destroy_scene)?;
        Ok(Self {
            handle,
            len: 0,
            _materials: PhantomData,
        })
    }

    /// Append a sphere. Nothing reaches the engine if any check fails.
    pub fn add_sphere(
        &mut self,
        center: DVec3,
        radius: f64,
        material: &'m Material,
    ) -> Result<(), BridgeError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(BridgeError::invalid(
                "radius",
                format!("must be finite and > 0, got {radius}"),
            ));
        }
        let scene = self.raw()?;
        if !material.belongs_to(self.handle.engine()) {
            return Err(BridgeError::invalid(
                "material",
                "created by a different engine than the scene",
            ));
        }
        let material_raw = material.raw()?;

        // SAFETY: both addresses are live and were issued by this engine.
        unsafe {
            self.handle
                .engine()
                .add_sphere(scene, center.to_array(), radius, material_raw)
        };
        self.len += 1;
        tracing::trace!(?center, radius, material = material.kind(), "added sphere");
        Ok(())
    }

    /// Add every sphere of a description, resolving materials by name.
    ///
    /// Stops at the first failure; spheres added before it stay in the scene.
    pub fn populate(
        &mut self,
        spheres: &[SphereDescription],
        library: &'m MaterialLibrary,
    ) -> Result<(), BridgeError> {
        for sphere in spheres {
            let material = library.get(&sphere.material).ok_or_else(|| {
                BridgeError::invalid(
                    "material",
                    format!("unknown material `{}`", sphere.material),
                )
            })?;
            self.add_sphere(sphere.center, sphere.radius, material)?;
        }
        Ok(())
    }

    /// Remove every sphere; the scene stays usable.
    pub fn clear(&mut self) -> Result<(), BridgeError> {
        let scene = self.raw()?;
        // SAFETY: live address issued by this engine.
        unsafe { self.handle.engine().clear_scene(scene) };
        self.len = 0;
        Ok(())
    }

    /// Free the engine-side scene. Calling it again does nothing.
    pub fn dispose(&mut self) {
        if self.handle.release() {
            self.len = 0;
        }
    }

    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    /// Spheres added since creation or the last `clear()`.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn raw(&self) -> Result<NonNull<c_void>, BridgeError> {
        self.handle
            .raw()
            .map_err(|_| BridgeError::UseAfterDispose { resource: "scene" })
    }

    pub(crate) fn belongs_to(&self, engine: &Arc<dyn Engine>) -> bool {
        self.handle.belongs_to(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bridge, DebugEngine};
    use raybridge_common::{Rgb, SceneDescription};

    fn setup() -> (Arc<DebugEngine>, Bridge) {
        let debug = Arc::new(DebugEngine::new());
        let bridge = Bridge::new(debug.clone());
        (debug, bridge)
    }

    #[test]
    fn add_sphere_forwards_to_engine() {
        let (debug, bridge) = setup();
        let ground = bridge.create_diffuse(Rgb::new(0.5, 0.5, 0.5)).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene
            .add_sphere(DVec3::new(0.0, -1000.0, 0.0), 1000.0, &ground)
            .unwrap();

        assert_eq!(scene.len(), 1);
        let spheres = debug.spheres(&scene).unwrap();
        assert_eq!(spheres.len(), 1);
        assert_eq!(spheres[0].center, [0.0, -1000.0, 0.0]);
        assert_eq!(spheres[0].radius, 1000.0);
        assert_eq!(spheres[0].material, ground.raw().unwrap().as_ptr().addr());
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let (debug, bridge) = setup();
        let glass = bridge.create_refractive(1.5).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene.add_sphere(DVec3::ZERO, 1.0, &glass).unwrap();

        for radius in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = scene.add_sphere(DVec3::ZERO, radius, &glass).unwrap_err();
            assert!(matches!(err, BridgeError::InvalidArgument(ref e) if e.name == "radius"));
        }
        assert_eq!(scene.len(), 1);
        assert_eq!(debug.sphere_count(&scene), Some(1));
        assert_eq!(debug.stats().spheres_added, 1);
    }

    #[test]
    fn clear_keeps_scene_usable() {
        let (debug, bridge) = setup();
        let glass = bridge.create_refractive(1.5).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene.add_sphere(DVec3::ZERO, 1.0, &glass).unwrap();
        scene.add_sphere(DVec3::X, 0.5, &glass).unwrap();

        scene.clear().unwrap();
        assert!(scene.is_empty());
        assert_eq!(debug.sphere_count(&scene), Some(0));

        scene.add_sphere(DVec3::Y, 2.0, &glass).unwrap();
        assert_eq!(scene.len(), 1);
        assert_eq!(debug.stats().scenes_created, 1);
    }

    #[test]
    fn disposed_scene_rejects_mutation() {
        let (debug, bridge) = setup();
        let glass = bridge.create_refractive(1.5).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene.dispose();
        assert!(scene.is_disposed());

        assert!(matches!(
            scene.add_sphere(DVec3::ZERO, 1.0, &glass),
            Err(BridgeError::UseAfterDispose { resource: "scene" })
        ));
        assert!(matches!(
            scene.clear(),
            Err(BridgeError::UseAfterDispose { resource: "scene" })
        ));
        let stats = debug.stats();
        assert_eq!(stats.spheres_added, 0);
        assert_eq!(stats.scene_clears, 0);
        assert_eq!(stats.invalid_handles, 0);
    }

    #[test]
    fn dispose_twice_releases_once() {
        let (debug, bridge) = setup();
        let mut scene = bridge.create_scene().unwrap();
        scene.dispose();
        scene.dispose();
        drop(scene);
        let stats = debug.stats();
        assert_eq!(stats.scenes_destroyed, 1);
        assert_eq!(stats.invalid_handles, 0);
    }

    #[test]
    fn disposed_material_is_rejected() {
        let (debug, bridge) = setup();
        let mut glass = bridge.create_refractive(1.5).unwrap();
        glass.dispose();
        let mut scene = bridge.create_scene().unwrap();
        assert!(matches!(
            scene.add_sphere(DVec3::ZERO, 1.0, &glass),
            Err(BridgeError::UseAfterDispose {
                resource: "material"
            })
        ));
        assert!(scene.is_empty());
        assert_eq!(debug.stats().spheres_added, 0);
    }

    #[test]
    fn material_from_other_engine_is_rejected() {
        let (_debug, bridge) = setup();
        let (_other_debug, other) = setup();
        let foreign = other.create_refractive(1.5).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        let err = scene.add_sphere(DVec3::ZERO, 1.0, &foreign).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref e) if e.name == "material"));
    }

    #[test]
    fn scene_does_not_own_materials() {
        let (debug, bridge) = setup();
        let glass = bridge.create_refractive(1.5).unwrap();
        {
            let mut scene = bridge.create_scene().unwrap();
            scene.add_sphere(DVec3::ZERO, 1.0, &glass).unwrap();
        }
        assert_eq!(debug.live_scenes(), 0);
        assert_eq!(debug.live_materials(), 1);
        assert!(!glass.is_disposed());
    }

    #[test]
    fn populate_from_description() {
        let (debug, bridge) = setup();
        let description = SceneDescription::demo();
        let library = bridge.create_materials(&description).unwrap();
        let mut scene = bridge.create_scene().unwrap();
        scene.populate(&description.spheres, &library).unwrap();
        assert_eq!(scene.len(), 4);
        assert_eq!(debug.sphere_count(&scene), Some(4));
    }

    #[test]
    fn populate_unknown_material_fails() {
        let (_debug, bridge) = setup();
        let library = MaterialLibrary::new();
        let mut scene = bridge.create_scene().unwrap();
        let spheres = [SphereDescription {
            center: DVec3::ZERO,
            radius: 1.0,
            material: "chrome".into(),
        }];
        let err = scene.populate(&spheres, &library).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(ref e) if e.name == "material"));
        assert!(scene.is_empty());
    }

    #[test]
    fn failed_scene_allocation() {
        let (debug, bridge) = setup();
        debug.set_fail_allocations(true);
        assert!(matches!(
            bridge.create_scene(),
            Err(BridgeError::ConstructionFailure { resource: "scene" })
        ));
    }
}
