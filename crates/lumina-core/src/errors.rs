use thiserror::Error;

#[derive(Debug, Error)]
pub enum LuminaError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceFailure),
    #[error("join failed: {0}")]
    JoinFailed(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("room error: {0}")]
    Room(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Why a camera could not be opened.
///
/// `InsecureContext` is kept apart from the other kinds because the fix is
/// serving the page over a secure transport, not granting a permission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceFailure {
    #[error("insecure context")]
    InsecureContext,
    #[error("permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

impl DeviceFailure {
    /// Text shown to the user in place of the preview.
    pub fn guidance(&self) -> &'static str {
        match self {
            DeviceFailure::InsecureContext => "Camera blocked. Browser requires HTTPS or localhost.",
            _ => "Camera permission denied or device not found.",
        }
    }

    pub fn is_insecure_context(&self) -> bool {
        matches!(self, DeviceFailure::InsecureContext)
    }
}
