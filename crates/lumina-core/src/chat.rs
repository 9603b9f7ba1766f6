use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};

use crate::errors::LuminaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSender {
    pub identity: String,
    pub is_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub from: ChatSender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message authored locally, stamped now.
    pub fn local(identity: &str, message: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: ChatSender {
                identity: identity.to_string(),
                is_local: true,
            },
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn sender_label(&self) -> &str {
        if self.from.is_local {
            "You"
        } else if self.from.identity.is_empty() {
            "Guest"
        } else {
            &self.from.identity
        }
    }

    /// `HH:MM` in UTC.
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }
}

/// Chat delivery provided by the session.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver `text` to the room and return the message as sent.
    async fn send(&self, text: &str) -> Result<ChatMessage, LuminaError>;
}

/// Shared message store between the session's event loop and ChatService.
pub type MessageStore = Arc<Mutex<Vec<ChatMessage>>>;

/// Append-only chat history for the current call.
pub struct ChatService {
    transport: Arc<dyn ChatTransport>,
    messages: MessageStore,
    count_tx: watch::Sender<usize>,
}

impl ChatService {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            transport,
            messages: Arc::new(Mutex::new(Vec::new())),
            count_tx,
        }
    }

    /// Send a message to everyone in the room.
    ///
    /// Whitespace-only input is rejected before reaching the transport. The
    /// message joins the history once the transport accepted it.
    pub async fn send(&self, text: &str) -> Result<ChatMessage, LuminaError> {
        if text.trim().is_empty() {
            return Err(LuminaError::Room("chat message is empty".into()));
        }
        let msg = self.transport.send(text).await?;
        self.append(msg.clone()).await;
        Ok(msg)
    }

    /// Handle an incoming chat message from the event loop.
    pub async fn handle_incoming(&self, msg: ChatMessage) {
        tracing::debug!("chat message from {}", msg.sender_label());
        self.append(msg).await;
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    /// Wakes whenever the history grows, e.g. to scroll to the bottom.
    pub fn watch_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Clear all messages (on disconnect).
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
        self.count_tx.send_replace(0);
    }

    async fn append(&self, msg: ChatMessage) {
        let mut messages = self.messages.lock().await;
        messages.push(msg);
        self.count_tx.send_replace(messages.len());
    }
}
