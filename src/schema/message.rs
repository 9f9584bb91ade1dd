/// External chat data types — guilds, channels, and messages as seen by the harvester.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper for guild (server) IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildId(pub u64);

/// Newtype wrapper for channel and thread IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of container a channel is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// Ordinary channel with its own message history.
    Text,
    /// Grouping container. Holds no messages of its own.
    Category,
    /// Forum channel; its messages live in its threads.
    Forum { threads: Vec<Channel> },
    /// A thread (forum post or channel thread).
    Thread,
}

/// A channel in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn text(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::Text,
        }
    }

    pub fn category(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::Category,
        }
    }

    pub fn thread(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::Thread,
        }
    }

    pub fn forum(id: u64, name: impl Into<String>, threads: Vec<Channel>) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::Forum { threads },
        }
    }
}

/// Read-only view of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub author_is_bot: bool,
    pub channel_id: ChannelId,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A message written by a human in `channel_id`, stamped now.
    pub fn from_user(channel_id: ChannelId, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            author_is_bot: false,
            channel_id,
            timestamp: Utc::now(),
        }
    }

    /// The first line of the content, or the empty string.
    pub fn first_line(&self) -> &str {
        self.content.lines().next().unwrap_or("")
    }
}
