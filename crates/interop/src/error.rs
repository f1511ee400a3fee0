use raybridge_common::InvalidArgument;

/// Errors surfaced by the engine bridge.
///
/// Validation failures (`InvalidArgument`, `UseAfterDispose`,
/// `UseAfterRelease`) are raised before any engine call is made.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error("{resource} used after it was disposed")]
    UseAfterDispose { resource: &'static str },
    #[error("{resource} handle used after it was released")]
    UseAfterRelease { resource: &'static str },
    #[error("engine failed to construct {resource}")]
    ConstructionFailure { resource: &'static str },
    #[error("engine call `{call}` failed: {detail}")]
    NativeCallFailure { call: &'static str, detail: String },
}

impl BridgeError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument(InvalidArgument::new(name, reason))
    }
}
