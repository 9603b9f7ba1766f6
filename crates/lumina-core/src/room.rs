use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::chat::{ChatMessage, ChatService, ChatTransport};
use crate::controls::{LocalParticipantControl, MeetingControls};
use crate::errors::LuminaError;
use crate::events::TrackSource;
use crate::participants::{MirrorSet, Participant, ParticipantSnapshot};
use crate::session::SessionConfig;

/// Room-level notifications from the session's event loop.
#[derive(Debug, Clone)]
pub enum RoomUpdate {
    /// Someone joined or left, or a publication appeared or vanished.
    ParticipantsChanged,
    ChatMessage(ChatMessage),
    /// Terminal: nothing follows.
    Disconnected { reason: String },
}

/// Joins a live session described by a [`SessionConfig`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Arc<dyn RoomHandle>, mpsc::UnboundedReceiver<RoomUpdate>), LuminaError>;
}

/// A connected session.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn local_participant(&self) -> Arc<dyn LocalParticipantControl>;
    /// Every participant in the room, local participant first.
    fn participants(&self) -> Vec<Arc<dyn Participant>>;
    fn chat(&self) -> Arc<dyn ChatTransport>;
    async fn disconnect(&self);
}

/// One grid cell: a participant and the track it shows.
#[derive(Clone)]
pub struct TileRef {
    pub participant: Arc<dyn Participant>,
    pub source: TrackSource,
    /// No publication yet; the tile shows the avatar.
    pub placeholder: bool,
}

/// Camera tiles for everyone (placeholders included) plus a screen-share
/// tile for each participant currently sharing.
pub fn tile_list(participants: &[Arc<dyn Participant>]) -> Vec<TileRef> {
    let mut tiles = Vec::with_capacity(participants.len());
    for participant in participants {
        tiles.push(TileRef {
            participant: participant.clone(),
            source: TrackSource::Camera,
            placeholder: participant.publication(TrackSource::Camera).is_none(),
        });
        if participant.publication(TrackSource::ScreenShare).is_some() {
            tiles.push(TileRef {
                participant: participant.clone(),
                source: TrackSource::ScreenShare,
                placeholder: false,
            });
        }
    }
    tiles
}

/// Name shown in the tile's corner.
pub fn tile_label(snapshot: &ParticipantSnapshot) -> String {
    match (snapshot.is_local, snapshot.identity.is_empty()) {
        (true, true) => "You (You)".to_string(),
        (true, false) => format!("{} (You)", snapshot.identity),
        (false, true) => "Guest".to_string(),
        (false, false) => snapshot.identity.clone(),
    }
}

/// Letter drawn on the fallback avatar.
pub fn avatar_initial(identity: &str) -> Option<String> {
    identity.chars().next().map(|c| c.to_uppercase().collect())
}

/// Forwards chat messages read concurrently, in the order the reads
/// started.
///
/// Each read runs in its own task, so a stalled sender never holds up the
/// caller; a single drain task awaits them in order and emits
/// [`RoomUpdate::ChatMessage`]. The drain task ends once the queue is dropped
/// and every queued read has finished.
pub struct OrderedChat {
    reads: mpsc::UnboundedSender<JoinHandle<Option<ChatMessage>>>,
}

impl OrderedChat {
    pub fn new(updates: mpsc::UnboundedSender<RoomUpdate>) -> Self {
        let (reads, mut queue) = mpsc::unbounded_channel::<JoinHandle<Option<ChatMessage>>>();
        tokio::spawn(async move {
            while let Some(read) = queue.recv().await {
                match read.await {
                    Ok(Some(msg)) => {
                        if updates.send(RoomUpdate::ChatMessage(msg)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("chat read task failed: {e}"),
                }
            }
        });
        Self { reads }
    }

    /// Start `read` now; its message is delivered after every earlier one.
    pub fn push<F>(&self, read: F)
    where
        F: Future<Output = Option<ChatMessage>> + Send + 'static,
    {
        if self.reads.send(tokio::spawn(read)).is_err() {
            tracing::debug!("chat queue closed, message dropped");
        }
    }
}

struct RoomState {
    tiles: Mutex<MirrorSet>,
    tiles_version: watch::Sender<u64>,
}

impl RoomState {
    fn tiles(&self) -> MutexGuard<'_, MirrorSet> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_tiles(&self, participants: &[Arc<dyn Participant>]) {
        let wanted: Vec<_> = tile_list(participants)
            .into_iter()
            .map(|t| (t.participant, t.source))
            .collect();
        self.tiles().sync(&wanted);
        self.tiles_version.send_modify(|v| *v += 1);
    }

    fn clear_tiles(&self) {
        self.tiles().clear();
        self.tiles_version.send_modify(|v| *v += 1);
    }
}

/// The live meeting view: control bar, tile mirrors and chat.
pub struct ActiveRoom {
    room: Arc<dyn RoomHandle>,
    controls: Arc<MeetingControls>,
    state: Arc<RoomState>,
    chat: Arc<ChatService>,
    chat_open: bool,
    left: Arc<AtomicBool>,
    event_task: Option<JoinHandle<()>>,
}

impl ActiveRoom {
    /// Connect and start mirroring. `on_disconnected` runs once if the
    /// session ends on its own; it is not called after [`ActiveRoom::leave`].
    pub async fn connect(
        connector: &dyn Connector,
        config: &SessionConfig,
        on_disconnected: impl FnOnce() + Send + 'static,
    ) -> Result<Self, LuminaError> {
        let (room, updates) = connector.connect(config).await?;
        tracing::info!("connected as '{}'", config.display_name);

        let controls = Arc::new(MeetingControls::new(room.local_participant()));
        let (tiles_version, _) = watch::channel(0);
        let state = Arc::new(RoomState {
            tiles: Mutex::new(MirrorSet::new()),
            tiles_version,
        });
        state.sync_tiles(&room.participants());
        let chat = Arc::new(ChatService::new(room.chat()));
        let left = Arc::new(AtomicBool::new(false));

        let event_task = tokio::spawn(Self::event_loop(
            updates,
            room.clone(),
            controls.clone(),
            state.clone(),
            chat.clone(),
            left.clone(),
            Box::new(on_disconnected),
        ));

        Ok(Self {
            room,
            controls,
            state,
            chat,
            chat_open: false,
            left,
            event_task: Some(event_task),
        })
    }

    pub fn controls(&self) -> &MeetingControls {
        &self.controls
    }

    pub fn tiles(&self) -> Vec<ParticipantSnapshot> {
        self.state.tiles().snapshots()
    }

    pub fn tile_count(&self) -> usize {
        self.state.tiles().len()
    }

    /// Bumped whenever the tile set is rebuilt.
    pub fn watch_tiles(&self) -> watch::Receiver<u64> {
        self.state.tiles_version.subscribe()
    }

    pub fn chat(&self) -> Arc<ChatService> {
        self.chat.clone()
    }

    pub fn is_chat_open(&self) -> bool {
        self.chat_open
    }

    pub fn toggle_chat(&mut self) {
        self.chat_open = !self.chat_open;
    }

    pub fn close_chat(&mut self) {
        self.chat_open = false;
    }

    /// Leave the call. Every mirror is closed before this returns.
    pub async fn leave(&mut self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("leaving room");
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.controls.close();
        self.state.clear_tiles();
        self.room.disconnect().await;
        self.chat.clear().await;
    }

    async fn event_loop(
        mut updates: mpsc::UnboundedReceiver<RoomUpdate>,
        room: Arc<dyn RoomHandle>,
        controls: Arc<MeetingControls>,
        state: Arc<RoomState>,
        chat: Arc<ChatService>,
        left: Arc<AtomicBool>,
        on_disconnected: Box<dyn FnOnce() + Send>,
    ) {
        while let Some(update) = updates.recv().await {
            match update {
                RoomUpdate::ParticipantsChanged => {
                    state.sync_tiles(&room.participants());
                }
                RoomUpdate::ChatMessage(msg) => {
                    chat.handle_incoming(msg).await;
                }
                RoomUpdate::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason}");
                    controls.close();
                    state.clear_tiles();
                    if !left.swap(true, Ordering::SeqCst) {
                        on_disconnected();
                    }
                    break;
                }
            }
        }
        tracing::info!("room event loop ended");
    }
}

impl Drop for ActiveRoom {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}
