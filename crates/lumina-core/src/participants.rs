use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::events::{
    ConnectionQuality, ParticipantEvent, ParticipantEventListener, Subscription, TrackSource,
};

/// Publication details read from the session for one track source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicationState {
    pub muted: bool,
    pub subscribed: bool,
    /// Whether a live media track is currently bound to the publication.
    pub has_track: bool,
}

/// Read surface of a participant owned by the external session.
///
/// Getters are synchronous and always reflect the session's current state.
/// The object outlives any view that reads it, so every listener added via
/// `subscribe` must be removed through the returned [`Subscription`].
pub trait Participant: Send + Sync {
    fn identity(&self) -> String;
    fn is_local(&self) -> bool;
    fn is_microphone_enabled(&self) -> bool;
    fn is_camera_enabled(&self) -> bool;
    fn is_screen_share_enabled(&self) -> bool;
    fn is_speaking(&self) -> bool;
    fn connection_quality(&self) -> ConnectionQuality;
    fn publication(&self, source: TrackSource) -> Option<PublicationState>;
    fn subscribe(&self, listener: Arc<dyn ParticipantEventListener>) -> Subscription;
}

/// The four conditions a tile checks before rendering video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoVisibility {
    pub publication_exists: bool,
    pub muted: bool,
    pub subscribed_or_local: bool,
    pub has_media_track: bool,
}

impl VideoVisibility {
    pub fn from_publication(publication: Option<PublicationState>, is_local: bool) -> Self {
        match publication {
            Some(p) => Self {
                publication_exists: true,
                muted: p.muted,
                subscribed_or_local: p.subscribed || is_local,
                has_media_track: p.has_track,
            },
            None => Self::default(),
        }
    }

    /// Video is shown only when all four conditions hold; otherwise the
    /// tile falls back to the avatar.
    pub fn is_visible(&self) -> bool {
        self.publication_exists && !self.muted && self.subscribed_or_local && self.has_media_track
    }
}

/// Read-only view of one participant for a single render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub is_local: bool,
    pub microphone_muted: bool,
    pub is_speaking: bool,
    pub video_visible: bool,
    pub connection_quality: ConnectionQuality,
}

impl ParticipantSnapshot {
    /// Read every getter once. `source` picks the track the tile renders.
    pub fn capture(participant: &dyn Participant, source: TrackSource) -> Self {
        let is_local = participant.is_local();
        let visibility = VideoVisibility::from_publication(participant.publication(source), is_local);
        Self {
            identity: participant.identity(),
            is_local,
            microphone_muted: !participant.is_microphone_enabled(),
            is_speaking: participant.is_speaking(),
            video_visible: visibility.is_visible(),
            connection_quality: participant.connection_quality(),
        }
    }
}

/// Whether a notification can change a snapshot.
pub fn is_relevant(event: &ParticipantEvent) -> bool {
    !matches!(event, ParticipantEvent::NameChanged(_))
}

/// Fold one notification into the snapshot.
///
/// Relevant notifications rebuild the whole snapshot from the getters
/// instead of patching single fields, so the result never depends on the
/// order fields were updated in.
pub fn reduce(
    current: ParticipantSnapshot,
    event: &ParticipantEvent,
    participant: &dyn Participant,
    source: TrackSource,
) -> ParticipantSnapshot {
    if is_relevant(event) {
        ParticipantSnapshot::capture(participant, source)
    } else {
        current
    }
}

/// Keeps a [`ParticipantSnapshot`] current for as long as it is open.
///
/// The initial snapshot is read when the mirror opens, without waiting for
/// a first notification. Dropping the mirror unsubscribes.
pub struct ParticipantMirror {
    identity: String,
    source: TrackSource,
    snapshot_rx: watch::Receiver<ParticipantSnapshot>,
    subscription: Option<Subscription>,
}

impl ParticipantMirror {
    pub fn open(participant: Arc<dyn Participant>, source: TrackSource) -> Self {
        let initial = ParticipantSnapshot::capture(participant.as_ref(), source);
        let identity = initial.identity.clone();
        let (tx, snapshot_rx) = watch::channel(initial);
        let tx = Arc::new(tx);

        let weak: Weak<dyn Participant> = Arc::downgrade(&participant);
        let listener_tx = tx.clone();
        let subscription = participant.subscribe(Arc::new(move |event: &ParticipantEvent| {
            let Some(participant) = weak.upgrade() else {
                return;
            };
            listener_tx.send_if_modified(|snapshot| {
                let next = reduce(snapshot.clone(), event, participant.as_ref(), source);
                let changed = next != *snapshot;
                *snapshot = next;
                changed
            });
        }));

        // Catch anything that changed between the first read and subscribing.
        tx.send_if_modified(|snapshot| {
            let next = ParticipantSnapshot::capture(participant.as_ref(), source);
            let changed = next != *snapshot;
            *snapshot = next;
            changed
        });

        tracing::debug!("participant mirror opened for {identity} ({source:?})");
        Self {
            identity,
            source,
            snapshot_rx,
            subscription: Some(subscription),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn snapshot(&self) -> ParticipantSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<ParticipantSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::debug!("participant mirror closed for {} ({:?})", self.identity, self.source);
        }
    }
}

impl Drop for ParticipantMirror {
    fn drop(&mut self) {
        self.close();
    }
}

/// One mirror per visible tile, kept in tile order.
#[derive(Default)]
pub struct MirrorSet {
    mirrors: Vec<ParticipantMirror>,
}

impl MirrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open mirrors for new tiles and close mirrors whose tile is gone.
    /// Tiles already mirrored keep their subscription.
    pub fn sync(&mut self, tiles: &[(Arc<dyn Participant>, TrackSource)]) {
        let mut previous = std::mem::take(&mut self.mirrors);
        for (participant, source) in tiles {
            let identity = participant.identity();
            let existing = previous
                .iter()
                .position(|m| m.identity == identity && m.source == *source);
            let mirror = match existing {
                Some(pos) => previous.remove(pos),
                None => ParticipantMirror::open(participant.clone(), *source),
            };
            self.mirrors.push(mirror);
        }
        // Mirrors left in `previous` unsubscribe when dropped here.
    }

    pub fn get(&self, identity: &str, source: TrackSource) -> Option<&ParticipantMirror> {
        self.mirrors
            .iter()
            .find(|m| m.identity == identity && m.source == source)
    }

    pub fn snapshots(&self) -> Vec<ParticipantSnapshot> {
        self.mirrors.iter().map(|m| m.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn clear(&mut self) {
        self.mirrors.clear();
    }
}
