use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::LuminaError;
use crate::events::{ConnectionQuality, ParticipantEvent, Subscription};
use crate::participants::Participant;

/// Local participant controls offered by the session.
///
/// Each setter is idempotent and is eventually reflected by a
/// published/unpublished/muted/unmuted notification.
#[async_trait]
pub trait LocalParticipantControl: Participant {
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), LuminaError>;
    async fn set_camera_enabled(&self, enabled: bool) -> Result<(), LuminaError>;
    async fn set_screen_share_enabled(&self, enabled: bool) -> Result<(), LuminaError>;
}

/// What the control bar renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub microphone_enabled: bool,
    pub camera_enabled: bool,
    pub screen_share_enabled: bool,
    pub connection_quality: ConnectionQuality,
}

impl ControlState {
    pub fn capture<P: Participant + ?Sized>(participant: &P) -> Self {
        Self {
            microphone_enabled: participant.is_microphone_enabled(),
            camera_enabled: participant.is_camera_enabled(),
            screen_share_enabled: participant.is_screen_share_enabled(),
            connection_quality: participant.connection_quality(),
        }
    }
}

fn is_control_event(event: &ParticipantEvent) -> bool {
    matches!(
        event,
        ParticipantEvent::LocalTrackPublished(_)
            | ParticipantEvent::LocalTrackUnpublished(_)
            | ParticipantEvent::TrackMuted(_)
            | ParticipantEvent::TrackUnmuted(_)
            | ParticipantEvent::ConnectionQualityChanged(_)
    )
}

/// Same contract as [`crate::participants::reduce`], for the control bar.
pub fn reduce_controls<P: Participant + ?Sized>(
    current: ControlState,
    event: &ParticipantEvent,
    participant: &P,
) -> ControlState {
    if is_control_event(event) {
        ControlState::capture(participant)
    } else {
        current
    }
}

/// Control bar state mirrored from the local participant.
///
/// Toggles compute their target from the mirrored state and never update it
/// themselves; the session's notification does. Two quick clicks before the
/// notification lands therefore ask for the same target twice, which the
/// idempotent setters absorb.
pub struct MeetingControls {
    participant: Arc<dyn LocalParticipantControl>,
    state_rx: watch::Receiver<ControlState>,
    subscription: Mutex<Option<Subscription>>,
}

impl MeetingControls {
    pub fn new(participant: Arc<dyn LocalParticipantControl>) -> Self {
        let (tx, state_rx) = watch::channel(ControlState::capture(participant.as_ref()));
        let tx = Arc::new(tx);

        let weak: Weak<dyn LocalParticipantControl> = Arc::downgrade(&participant);
        let listener_tx = tx.clone();
        let subscription = participant.subscribe(Arc::new(move |event: &ParticipantEvent| {
            let Some(participant) = weak.upgrade() else {
                return;
            };
            listener_tx.send_if_modified(|state| {
                let next = reduce_controls(*state, event, participant.as_ref());
                let changed = next != *state;
                *state = next;
                changed
            });
        }));

        tx.send_if_modified(|state| {
            let next = ControlState::capture(participant.as_ref());
            let changed = next != *state;
            *state = next;
            changed
        });

        Self {
            participant,
            state_rx,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn state(&self) -> ControlState {
        *self.state_rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ControlState> {
        self.state_rx.clone()
    }

    pub async fn toggle_microphone(&self) -> Result<(), LuminaError> {
        let enabled = !self.state().microphone_enabled;
        tracing::info!("microphone enabled: {enabled}");
        self.participant.set_microphone_enabled(enabled).await
    }

    pub async fn toggle_camera(&self) -> Result<(), LuminaError> {
        let enabled = !self.state().camera_enabled;
        tracing::info!("camera enabled: {enabled}");
        self.participant.set_camera_enabled(enabled).await
    }

    pub async fn toggle_screen_share(&self) -> Result<(), LuminaError> {
        let enabled = !self.state().screen_share_enabled;
        tracing::info!("screen share enabled: {enabled}");
        self.participant.set_screen_share_enabled(enabled).await
    }

    pub fn is_open(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop mirroring. The state keeps its last value.
    pub fn close(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

impl Drop for MeetingControls {
    fn drop(&mut self) {
        self.close();
    }
}
