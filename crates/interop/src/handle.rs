//! Exclusive ownership of one engine-allocated address.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::BridgeError;

/// Engine call that frees one address of a given resource kind.
pub type Destructor = fn(&dyn Engine, NonNull<c_void>);

/// Owner of one opaque engine address.
///
/// Null is the invalid sentinel and never becomes a handle. The destructor
/// supplied at acquisition runs exactly once: on the first `release()` or,
/// failing that, on drop. After release every access through `raw()` fails.
///
/// Holds a raw pointer, so it is neither `Send` nor `Sync`.
pub struct NativeHandle {
    raw: Option<NonNull<c_void>>,
    resource: &'static str,
    destroy: Destructor,
    engine: Arc<dyn Engine>,
}

impl NativeHandle {
    /// Run `create` against `engine` and take ownership of the result.
    ///
    /// `resource` labels the handle in logs and errors.
    pub fn acquire(
        engine: &Arc<dyn Engine>,
        resource: &'static str,
        create: impl FnOnce(&dyn Engine) -> *mut c_void,
        destroy: Destructor,
    ) -> Result<Self, BridgeError> {
        let raw = NonNull::new(create(engine.as_ref()))
            .ok_or(BridgeError::ConstructionFailure { resource })?;
        tracing::debug!(resource, addr = ?raw, engine = engine.name(), "acquired handle");
        Ok(Self {
            raw: Some(raw),
            resource,
            destroy,
            engine: Arc::clone(engine),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_some()
    }

    /// The live address, or `UseAfterRelease`.
    pub fn raw(&self) -> Result<NonNull<c_void>, BridgeError> {
        self.raw.ok_or(BridgeError::UseAfterRelease {
            resource: self.resource,
        })
    }

    /// Free the address. Returns whether this call performed the release.
    pub fn release(&mut self) -> bool {
        match self.raw.take() {
            Some(raw) => {
                tracing::debug!(resource = self.resource, addr = ?raw, "releasing handle");
                (self.destroy)(self.engine.as_ref(), raw);
                true
            }
            None => false,
        }
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Whether this handle was allocated by `engine`.
    pub fn belongs_to(&self, engine: &Arc<dyn Engine>) -> bool {
        Arc::ptr_eq(&self.engine, engine)
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("resource", &self.resource)
            .field("raw", &self.raw)
            .field("engine", &self.engine.name())
            .finish()
    }
}
