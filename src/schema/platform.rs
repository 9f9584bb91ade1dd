/// Chat platform contract — what the harvester needs from a chat client.
///
/// Connection lifecycle, authentication, and rate-limit backoff belong to the
/// implementor.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use super::message::{Channel, ChannelId, GuildId, Message};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("guild not found: {0}")]
    GuildNotFound(GuildId),
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),
    #[error("request failed: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PlatformError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
            source: None,
        }
    }
}

/// Adapter for a group-chat platform client.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// All channels of a guild, including categories and forums.
    async fn list_channels(&self, guild: GuildId) -> Result<Vec<Channel>, PlatformError>;

    /// Message history of a channel or thread, optionally only messages
    /// newer than `after`. The stream is consumed lazily.
    fn fetch_history<'a>(
        &'a self,
        channel: &'a Channel,
        after: Option<DateTime<Utc>>,
    ) -> BoxStream<'a, Result<Message, PlatformError>>;

    /// Posts a plain-text message to a channel.
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError>;
}
