//! Lumina meeting client core.
//!
//! Pre-join camera preview, token-based join, and mirrors that keep
//! participant snapshots in sync with a live session. UI shells render
//! the snapshots; platform media and the session SDK sit behind traits.
//! The LiveKit-backed session lives behind the `livekit` feature.

pub mod auth;
pub mod chat;
pub mod controls;
pub mod device;
pub mod errors;
pub mod events;
#[cfg(feature = "livekit")]
pub mod livekit_room;
pub mod logging;
pub mod media;
pub mod participants;
pub mod prejoin;
pub mod room;
pub mod session;
pub mod settings;

pub use auth::{HttpTokenProvider, TokenError, TokenProvider};
pub use chat::{ChatMessage, ChatService, ChatTransport};
pub use controls::{ControlState, LocalParticipantControl, MeetingControls};
pub use device::{CapturePhase, DeviceSessionManager, PreviewState};
pub use errors::{DeviceFailure, LuminaError};
pub use events::{ConnectionQuality, ParticipantEvent, Subscription, TrackSource};
pub use logging::init_logging;
pub use media::{CameraBackend, CaptureConstraints};
pub use participants::{MirrorSet, Participant, ParticipantMirror, ParticipantSnapshot};
pub use prejoin::PreJoin;
pub use room::{ActiveRoom, Connector, RoomHandle, RoomUpdate};
pub use session::{JoinController, JoinRequest, JoinState, SessionConfig};
pub use settings::{Settings, SettingsStore};
