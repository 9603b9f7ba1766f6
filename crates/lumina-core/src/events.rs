use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Notifications fired by an external participant object.
///
/// Each one is delivered to every listener currently subscribed on that
/// participant, in the order the session emitted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    LocalTrackPublished(TrackSource),
    LocalTrackUnpublished(TrackSource),
    TrackPublished(TrackSource),
    TrackUnpublished(TrackSource),
    TrackSubscribed(TrackSource),
    TrackUnsubscribed(TrackSource),
    TrackMuted(TrackSource),
    TrackUnmuted(TrackSource),
    IsSpeakingChanged(bool),
    ConnectionQualityChanged(ConnectionQuality),
    NameChanged(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionQuality {
    #[default]
    Unknown,
    Excellent,
    Good,
    Poor,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

/// Trait for receiving participant notifications.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait ParticipantEventListener: Send + Sync {
    fn on_event(&self, event: &ParticipantEvent);
}

impl<F> ParticipantEventListener for F
where
    F: Fn(&ParticipantEvent) + Send + Sync,
{
    fn on_event(&self, event: &ParticipantEvent) {
        self(event)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Arc<dyn ParticipantEventListener>)>,
}

/// Listener registry owned by one participant object.
///
/// Listeners are only added through [`EventEmitter::subscribe`], which hands
/// back the [`Subscription`] that removes them again.
#[derive(Clone, Default)]
pub struct EventEmitter {
    registry: Arc<RwLock<Registry>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ParticipantEventListener>) -> Subscription {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            active: true,
        }
    }

    pub fn emit(&self, event: ParticipantEvent) {
        // Dispatch outside the lock so a listener may unsubscribe itself.
        let listeners: Vec<_> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// Handle for one registered listener. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<RwLock<Registry>>,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
