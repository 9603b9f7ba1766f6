use async_trait::async_trait;

use crate::errors::{DeviceFailure, LuminaError};

/// Default preview resolution.
pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: PREVIEW_WIDTH,
            height: PREVIEW_HEIGHT,
        }
    }
}

/// Platform camera layer consumed by the device session manager.
///
/// `acquire` may suspend for as long as the OS permission prompt is shown.
/// It cannot be aborted once started; callers discard unwanted results by
/// releasing them.
#[async_trait]
pub trait CameraBackend: Send + Sync + 'static {
    /// An open capture on the local camera.
    type Handle: Send + Sync + 'static;
    /// A rendering surface frames can be attached to.
    type Sink: Clone + PartialEq + Send + Sync + 'static;

    async fn acquire(&self, constraints: CaptureConstraints) -> Result<Self::Handle, DeviceFailure>;

    fn attach(&self, handle: &Self::Handle, sink: &Self::Sink) -> Result<(), LuminaError>;

    fn detach(&self, handle: &Self::Handle, sink: &Self::Sink) -> Result<(), LuminaError>;

    async fn release(&self, handle: Self::Handle) -> Result<(), LuminaError>;

    /// Whether capture is permitted from the current origin at all.
    fn is_secure_context(&self) -> bool {
        true
    }
}
