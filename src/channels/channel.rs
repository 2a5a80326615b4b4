//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;
use crate::store::UserId;

/// Inbound message stream produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// One inbound text message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel that produced the message.
    pub channel: String,
    pub user_id: UserId,
    /// Platform display name (e.g. Telegram full name).
    pub user_name: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    /// Channel-specific extras (chat id, platform username).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: UserId, content: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            user_id,
            user_name: String::new(),
            content: content.into(),
            received_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    /// Quick-reply labels. `None` clears any keyboard shown earlier.
    pub options: Option<Vec<String>>,
}

impl OutgoingResponse {
    /// Plain text; clears quick replies.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            options: None,
        }
    }

    /// Text with a quick-reply keyboard.
    pub fn with_options<I, S>(content: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content: content.into(),
            options: Some(options.into_iter().map(Into::into).collect()),
        }
    }
}

/// An entry in the transport's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCommand {
    pub command: &'static str,
    pub description: &'static str,
}

/// A messaging transport.
///
/// `send` addresses users directly (not a prior message) so reminder tasks
/// can deliver without any inbound message or session in hand.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a message to a user.
    async fn send(&self, user_id: UserId, response: OutgoingResponse)
    -> Result<(), ChannelError>;

    /// Show a "typing" indicator, where the transport has one.
    async fn send_typing(&self, _user_id: UserId) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Register the command menu with the transport.
    async fn register_commands(&self, _commands: &[BotCommand]) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
