use raybridge_common::MAX_IMAGE_WIDTH;
use std::ffi::CString;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::BridgeError;

fn dimension(name: &'static str, value: u32, max: u32) -> Result<i32, BridgeError> {
    if value == 0 {
        return Err(BridgeError::invalid(name, "must be > 0"));
    }
    if value > max {
        return Err(BridgeError::invalid(name, format!("{value} exceeds {max}")));
    }
    i32::try_from(value).map_err(|_| BridgeError::invalid(name, format!("{value} does not fit i32")))
}

/// Hand a finished buffer to the engine's encoder.
///
/// All arguments are checked before the call. The engine's status is read
/// under `Engine::save_convention`; a failure is reported with the raw
/// status in the detail.
pub(crate) fn save_png(
    engine: &Arc<dyn Engine>,
    path: &Path,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<(), BridgeError> {
    let w = dimension("width", width, MAX_IMAGE_WIDTH)?;
    let h = dimension("height", height, i32::MAX.unsigned_abs())?;
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| BridgeError::invalid("pixels", "width * height * 4 overflows usize"))?;
    if pixels.len() != expected {
        return Err(BridgeError::invalid(
            "pixels",
            format!("expected {expected} bytes for {width}x{height}, got {}", pixels.len()),
        ));
    }
    let utf8 = path
        .to_str()
        .ok_or_else(|| BridgeError::invalid("path", format!("{} is not valid UTF-8", path.display())))?;
    let c_path = CString::new(utf8)
        .map_err(|_| BridgeError::invalid("path", "contains a NUL byte"))?;

    let data = NonNull::from(pixels).cast::<u8>();
    // SAFETY: `pixels` holds exactly width * height * 4 bytes and outlives the call.
    let status = unsafe { engine.save_pixels(&c_path, w, h, data) };
    if engine.save_convention().succeeded(status) {
        tracing::info!(path = %path.display(), width, height, "saved image");
        Ok(())
    } else {
        Err(BridgeError::NativeCallFailure {
            call: "save_pixels",
            detail: format!("{} returned status {status} for {}", engine.name(), path.display()),
        })
    }
}
