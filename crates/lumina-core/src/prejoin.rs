use std::sync::Arc;

use crate::device::{DeviceSessionManager, PreviewState};
use crate::media::CameraBackend;
use crate::session::JoinRequest;
use crate::settings::Settings;

/// Pre-join screen: the form fields, the audio intent and the camera
/// preview.
///
/// Audio has no hardware behind it at this stage; the flag is forwarded to
/// the live session. Video is driven by the device session manager.
pub struct PreJoin<B: CameraBackend> {
    room_name: String,
    display_name: String,
    audio_enabled: bool,
    device: DeviceSessionManager<B>,
}

impl<B: CameraBackend> PreJoin<B> {
    /// Prefill from saved settings and open the preview at the saved
    /// resolution. Must run inside a tokio runtime.
    pub fn new(camera: Arc<B>, settings: &Settings) -> Self {
        let device = DeviceSessionManager::with_constraints(camera, settings.preview_constraints());
        if settings.video_enabled_on_join {
            device.set_video_requested(true);
        }
        Self {
            room_name: settings.last_room.clone().unwrap_or_default(),
            display_name: settings.display_name.clone().unwrap_or_default(),
            audio_enabled: settings.audio_enabled_on_join,
            device,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn set_room_name(&mut self, room_name: impl Into<String>) {
        self.room_name = room_name.into();
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn toggle_audio(&mut self) {
        self.audio_enabled = !self.audio_enabled;
    }

    pub fn video_enabled(&self) -> bool {
        self.device.state().video_requested
    }

    pub fn toggle_video(&self) {
        self.device.set_video_requested(!self.video_enabled());
    }

    pub fn preview(&self) -> PreviewState {
        self.device.state()
    }

    pub fn device(&self) -> &DeviceSessionManager<B> {
        &self.device
    }

    /// Message to show instead of the preview after a camera failure.
    pub fn media_error(&self) -> Option<&'static str> {
        self.device.state().error.map(|e| e.guidance())
    }

    pub fn can_submit(&self) -> bool {
        !self.room_name.trim().is_empty() && !self.display_name.trim().is_empty()
    }

    /// Validate the form and hand the camera over to the live session.
    ///
    /// Returns `None` (and keeps the preview running) when a field is empty.
    /// The camera release is not awaited.
    pub fn submit(&self) -> Option<JoinRequest> {
        if !self.can_submit() {
            tracing::debug!("join submitted with empty room or name");
            return None;
        }
        self.device.hand_off();
        Some(JoinRequest {
            room_name: self.room_name.trim().to_string(),
            participant_name: self.display_name.trim().to_string(),
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled(),
        })
    }

    /// Leave the pre-join screen for good.
    pub async fn dispose(&self) {
        self.device.dispose().await;
    }
}
