//! LiveKit-backed session: the real implementation of [`Connector`],
//! [`RoomHandle`], [`Participant`] and [`ChatTransport`].
//!
//! The SDK's room-wide event stream is demultiplexed into one
//! [`EventEmitter`] per participant, so mirrors only hear about the
//! participant they watch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use livekit::data_stream::StreamTextOptions;
use livekit::options::TrackPublishOptions;
use livekit::participant::ConnectionQuality as LkConnectionQuality;
use livekit::prelude::{
    LocalAudioTrack, LocalParticipant, LocalTrack, LocalVideoTrack, RemoteParticipant, Room,
    RoomEvent, RoomOptions,
};
use livekit::track::TrackSource as LkTrackSource;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource, RtcVideoSource, VideoResolution};
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::sync::mpsc;

use crate::chat::{ChatMessage, ChatSender, ChatTransport};
use crate::controls::LocalParticipantControl;
use crate::errors::LuminaError;
use crate::events::{
    ConnectionQuality, EventEmitter, ParticipantEvent, ParticipantEventListener, Subscription,
    TrackSource,
};
use crate::participants::{Participant, PublicationState};
use crate::room::{Connector, OrderedChat, RoomHandle, RoomUpdate};
use crate::session::SessionConfig;
use crate::settings::validate_server_url;

/// Topic LiveKit Meet clients use for chat text streams.
const CHAT_TOPIC: &str = "lk.chat";

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;

fn from_lk_source(source: LkTrackSource) -> TrackSource {
    match source {
        LkTrackSource::Microphone => TrackSource::Microphone,
        LkTrackSource::Camera => TrackSource::Camera,
        LkTrackSource::Screenshare => TrackSource::ScreenShare,
        _ => TrackSource::Unknown,
    }
}

fn from_lk_quality(quality: LkConnectionQuality) -> ConnectionQuality {
    match quality {
        LkConnectionQuality::Excellent => ConnectionQuality::Excellent,
        LkConnectionQuality::Good => ConnectionQuality::Good,
        LkConnectionQuality::Poor => ConnectionQuality::Poor,
        LkConnectionQuality::Lost => ConnectionQuality::Lost,
    }
}

fn is_live(publication: Option<PublicationState>) -> bool {
    publication.is_some_and(|p| !p.muted)
}

struct RemoteMember {
    participant: RemoteParticipant,
    emitter: EventEmitter,
}

impl Participant for RemoteMember {
    fn identity(&self) -> String {
        self.participant.identity().to_string()
    }

    fn is_local(&self) -> bool {
        false
    }

    fn is_microphone_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::Microphone))
    }

    fn is_camera_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::Camera))
    }

    fn is_screen_share_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::ScreenShare))
    }

    fn is_speaking(&self) -> bool {
        self.participant.is_speaking()
    }

    fn connection_quality(&self) -> ConnectionQuality {
        from_lk_quality(self.participant.connection_quality())
    }

    fn publication(&self, source: TrackSource) -> Option<PublicationState> {
        self.participant
            .track_publications()
            .into_values()
            .find(|p| from_lk_source(p.source()) == source)
            .map(|p| PublicationState {
                muted: p.is_muted(),
                subscribed: p.is_subscribed(),
                has_track: p.track().is_some(),
            })
    }

    fn subscribe(&self, listener: Arc<dyn ParticipantEventListener>) -> Subscription {
        self.emitter.subscribe(listener)
    }
}

/// The local participant plus the native sources platform capture feeds.
pub struct LocalMember {
    participant: LocalParticipant,
    emitter: EventEmitter,
    audio_source: Mutex<Option<NativeAudioSource>>,
    camera_source: Mutex<Option<NativeVideoSource>>,
    screen_source: Mutex<Option<NativeVideoSource>>,
}

impl LocalMember {
    fn new(participant: LocalParticipant) -> Self {
        Self {
            participant,
            emitter: EventEmitter::new(),
            audio_source: Mutex::new(None),
            camera_source: Mutex::new(None),
            screen_source: Mutex::new(None),
        }
    }

    /// Where platform audio capture pushes PCM frames.
    pub fn audio_source(&self) -> Option<NativeAudioSource> {
        lock(&self.audio_source).clone()
    }

    pub fn camera_source(&self) -> Option<NativeVideoSource> {
        lock(&self.camera_source).clone()
    }

    pub fn screen_source(&self) -> Option<NativeVideoSource> {
        lock(&self.screen_source).clone()
    }

    async fn set_source_enabled(&self, source: LkTrackSource, enabled: bool) -> Result<(), LuminaError> {
        let existing = self
            .participant
            .track_publications()
            .into_values()
            .find(|p| p.source() == source);

        match existing {
            Some(publication) if enabled => {
                publication.unmute();
            }
            Some(publication) => {
                publication.mute();
            }
            None if enabled => self.publish(source).await?,
            None => {}
        }

        let source = from_lk_source(source);
        self.emitter.emit(if enabled {
            ParticipantEvent::TrackUnmuted(source)
        } else {
            ParticipantEvent::TrackMuted(source)
        });
        tracing::info!("{source:?} enabled: {enabled}");
        Ok(())
    }

    async fn publish(&self, source: LkTrackSource) -> Result<(), LuminaError> {
        let (track, name) = match source {
            LkTrackSource::Microphone => {
                let native = NativeAudioSource::new(
                    AudioSourceOptions {
                        echo_cancellation: true,
                        noise_suppression: true,
                        auto_gain_control: true,
                    },
                    AUDIO_SAMPLE_RATE,
                    AUDIO_CHANNELS,
                    AUDIO_QUEUE_SIZE_MS,
                );
                let track = LocalAudioTrack::create_audio_track(
                    "microphone",
                    RtcAudioSource::Native(native.clone()),
                );
                *lock(&self.audio_source) = Some(native);
                (LocalTrack::Audio(track), "microphone")
            }
            LkTrackSource::Camera | LkTrackSource::Screenshare => {
                let screencast = source == LkTrackSource::Screenshare;
                let native = NativeVideoSource::new(
                    VideoResolution {
                        width: VIDEO_WIDTH,
                        height: VIDEO_HEIGHT,
                    },
                    screencast,
                );
                let name = if screencast { "screen_share" } else { "camera" };
                let track =
                    LocalVideoTrack::create_video_track(name, RtcVideoSource::Native(native.clone()));
                let slot = if screencast {
                    &self.screen_source
                } else {
                    &self.camera_source
                };
                *lock(slot) = Some(native);
                (LocalTrack::Video(track), name)
            }
            _ => return Err(LuminaError::Room("unsupported track source".into())),
        };

        self.participant
            .publish_track(
                track,
                TrackPublishOptions {
                    source,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| LuminaError::Room(format!("publish {name}: {e}")))?;

        tracing::info!("{name} track published");
        Ok(())
    }
}

impl Participant for LocalMember {
    fn identity(&self) -> String {
        self.participant.identity().to_string()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn is_microphone_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::Microphone))
    }

    fn is_camera_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::Camera))
    }

    fn is_screen_share_enabled(&self) -> bool {
        is_live(self.publication(TrackSource::ScreenShare))
    }

    fn is_speaking(&self) -> bool {
        self.participant.is_speaking()
    }

    fn connection_quality(&self) -> ConnectionQuality {
        from_lk_quality(self.participant.connection_quality())
    }

    fn publication(&self, source: TrackSource) -> Option<PublicationState> {
        self.participant
            .track_publications()
            .into_values()
            .find(|p| from_lk_source(p.source()) == source)
            .map(|p| PublicationState {
                muted: p.is_muted(),
                subscribed: true,
                has_track: p.track().is_some(),
            })
    }

    fn subscribe(&self, listener: Arc<dyn ParticipantEventListener>) -> Subscription {
        self.emitter.subscribe(listener)
    }
}

#[async_trait]
impl LocalParticipantControl for LocalMember {
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), LuminaError> {
        self.set_source_enabled(LkTrackSource::Microphone, enabled).await
    }

    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), LuminaError> {
        self.set_source_enabled(LkTrackSource::Camera, enabled).await
    }

    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), LuminaError> {
        self.set_source_enabled(LkTrackSource::Screenshare, enabled).await
    }
}

struct LiveKitChat {
    participant: LocalParticipant,
}

#[async_trait]
impl ChatTransport for LiveKitChat {
    async fn send(&self, text: &str) -> Result<ChatMessage, LuminaError> {
        let options = StreamTextOptions {
            topic: CHAT_TOPIC.to_string(),
            ..Default::default()
        };
        let info = self
            .participant
            .send_text(text, options)
            .await
            .map_err(|e| LuminaError::Room(format!("send chat: {e}")))?;

        Ok(ChatMessage {
            id: info.id,
            from: ChatSender {
                identity: self.participant.identity().to_string(),
                is_local: true,
            },
            message: text.to_string(),
            timestamp: DateTime::from_timestamp_millis(info.timestamp.timestamp_millis())
                .unwrap_or_else(Utc::now),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connected LiveKit room.
pub struct LiveKitRoom {
    room: Arc<Room>,
    local: Arc<LocalMember>,
    remotes: Mutex<Vec<Arc<RemoteMember>>>,
}

impl LiveKitRoom {
    fn new(room: Arc<Room>) -> Self {
        let local = Arc::new(LocalMember::new(room.local_participant()));
        let remotes = room
            .remote_participants()
            .into_values()
            .map(|participant| {
                Arc::new(RemoteMember {
                    participant,
                    emitter: EventEmitter::new(),
                })
            })
            .collect();
        Self {
            room,
            local,
            remotes: Mutex::new(remotes),
        }
    }

    /// The local participant, for wiring platform capture into its sources.
    pub fn local(&self) -> Arc<LocalMember> {
        self.local.clone()
    }

    fn add_remote(&self, participant: RemoteParticipant) {
        let mut remotes = lock(&self.remotes);
        let identity = participant.identity().to_string();
        if remotes.iter().any(|m| m.identity() == identity) {
            return;
        }
        remotes.push(Arc::new(RemoteMember {
            participant,
            emitter: EventEmitter::new(),
        }));
    }

    fn remove_remote(&self, identity: &str) {
        lock(&self.remotes).retain(|m| m.identity() != identity);
    }

    fn emitter_for(&self, identity: &str) -> Option<EventEmitter> {
        if self.local.identity() == identity {
            return Some(self.local.emitter.clone());
        }
        lock(&self.remotes)
            .iter()
            .find(|m| m.identity() == identity)
            .map(|m| m.emitter.clone())
    }

    fn emit_to(&self, identity: &str, event: ParticipantEvent) {
        match self.emitter_for(identity) {
            Some(emitter) => emitter.emit(event),
            None => tracing::debug!("event for unknown participant {identity}: {event:?}"),
        }
    }

    fn all_emitters(&self) -> Vec<(String, EventEmitter)> {
        let mut all = vec![(self.local.identity(), self.local.emitter.clone())];
        all.extend(
            lock(&self.remotes)
                .iter()
                .map(|m| (m.identity(), m.emitter.clone())),
        );
        all
    }
}

#[async_trait]
impl RoomHandle for LiveKitRoom {
    fn local_participant(&self) -> Arc<dyn LocalParticipantControl> {
        self.local.clone()
    }

    fn participants(&self) -> Vec<Arc<dyn Participant>> {
        let mut all: Vec<Arc<dyn Participant>> = vec![self.local.clone()];
        for member in lock(&self.remotes).iter() {
            all.push(member.clone());
        }
        all
    }

    fn chat(&self) -> Arc<dyn ChatTransport> {
        Arc::new(LiveKitChat {
            participant: self.local.participant.clone(),
        })
    }

    async fn disconnect(&self) {
        if let Err(e) = self.room.close().await {
            tracing::warn!("error closing room: {e}");
        }
        lock(&self.remotes).clear();
    }
}

/// Dials a LiveKit server with the token from the join step.
#[derive(Default)]
pub struct LiveKitConnector;

#[async_trait]
impl Connector for LiveKitConnector {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Arc<dyn RoomHandle>, mpsc::UnboundedReceiver<RoomUpdate>), LuminaError> {
        validate_server_url(&config.server_url)?;

        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, events) = Room::connect(&config.server_url, &config.auth_token, options)
            .await
            .map_err(|e| LuminaError::Connection(e.to_string()))?;

        let handle = Arc::new(LiveKitRoom::new(Arc::new(room)));
        tracing::info!(
            "connected to {} with {} remote participant(s)",
            config.server_url,
            lock(&handle.remotes).len()
        );

        // Join intents from the pre-join screen. A failure here leaves the
        // user in the call with that device off.
        if config.audio_enabled {
            if let Err(e) = handle.local.set_microphone_enabled(true).await {
                tracing::warn!("could not enable microphone on join: {e}");
            }
        }
        if config.video_enabled {
            if let Err(e) = handle.local.set_camera_enabled(true).await {
                tracing::warn!("could not enable camera on join: {e}");
            }
        }

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        tokio::spawn(event_loop(events, handle.clone(), updates_tx));

        Ok((handle, updates_rx))
    }
}

async fn event_loop(
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    room: Arc<LiveKitRoom>,
    updates: mpsc::UnboundedSender<RoomUpdate>,
) {
    let notify = |update: RoomUpdate| {
        if updates.send(update).is_err() {
            tracing::debug!("room update dropped, nobody is listening");
        }
    };
    let chat = OrderedChat::new(updates.clone());

    while let Some(event) = events.recv().await {
        match event {
            RoomEvent::ParticipantConnected(participant) => {
                tracing::info!("participant joined: {}", participant.identity());
                room.add_remote(participant);
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::ParticipantDisconnected(participant) => {
                let identity = participant.identity().to_string();
                tracing::info!("participant left: {identity}");
                room.remove_remote(&identity);
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::LocalTrackPublished { publication, .. } => {
                let source = from_lk_source(publication.source());
                room.local.emitter.emit(ParticipantEvent::LocalTrackPublished(source));
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::LocalTrackUnpublished { publication, .. } => {
                let source = from_lk_source(publication.source());
                room.local.emitter.emit(ParticipantEvent::LocalTrackUnpublished(source));
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::TrackPublished { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackPublished(source));
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::TrackUnpublished { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackUnpublished(source));
                notify(RoomUpdate::ParticipantsChanged);
            }

            RoomEvent::TrackSubscribed { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackSubscribed(source));
            }

            RoomEvent::TrackUnsubscribed { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackUnsubscribed(source));
            }

            RoomEvent::TrackMuted { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackMuted(source));
            }

            RoomEvent::TrackUnmuted { participant, publication, .. } => {
                let source = from_lk_source(publication.source());
                room.emit_to(&participant.identity().to_string(), ParticipantEvent::TrackUnmuted(source));
            }

            RoomEvent::ActiveSpeakersChanged { speakers } => {
                let speaking: Vec<String> = speakers.iter().map(|p| p.identity().to_string()).collect();
                for (identity, emitter) in room.all_emitters() {
                    emitter.emit(ParticipantEvent::IsSpeakingChanged(speaking.contains(&identity)));
                }
            }

            RoomEvent::ConnectionQualityChanged { quality, participant } => {
                room.emit_to(
                    &participant.identity().to_string(),
                    ParticipantEvent::ConnectionQualityChanged(from_lk_quality(quality)),
                );
            }

            RoomEvent::TextStreamOpened {
                reader,
                topic,
                participant_identity,
            } => {
                if topic != CHAT_TOPIC {
                    tracing::debug!("text stream on topic {topic} ignored");
                    continue;
                }
                let Some(reader) = reader.take() else {
                    tracing::warn!("chat text stream reader already taken");
                    continue;
                };
                let id = reader.info().id.clone();
                let timestamp = DateTime::from_timestamp_millis(reader.info().timestamp.timestamp_millis())
                    .unwrap_or_else(Utc::now);
                let identity = participant_identity.to_string();
                chat.push(async move {
                    match reader.read_all().await {
                        Ok(text) => Some(ChatMessage {
                            id,
                            from: ChatSender {
                                identity,
                                is_local: false,
                            },
                            message: text,
                            timestamp,
                        }),
                        Err(e) => {
                            tracing::warn!("failed to read chat text stream: {e}");
                            None
                        }
                    }
                });
            }

            RoomEvent::ChatMessage {
                message, participant, ..
            } => {
                let identity = participant
                    .as_ref()
                    .map(|p| p.identity().to_string())
                    .unwrap_or_default();
                let msg = ChatMessage {
                    id: message.id,
                    from: ChatSender {
                        identity,
                        is_local: false,
                    },
                    message: message.message,
                    timestamp: DateTime::from_timestamp_millis(message.timestamp).unwrap_or_else(Utc::now),
                };
                chat.push(async move { Some(msg) });
            }

            RoomEvent::Disconnected { reason } => {
                tracing::info!("room disconnected: {reason:?}");
                lock(&room.remotes).clear();
                notify(RoomUpdate::Disconnected {
                    reason: format!("{reason:?}"),
                });
                break;
            }

            _ => {
                tracing::debug!("unhandled room event: {event:?}");
            }
        }
    }

    tracing::info!("room event loop ended");
}
