//! Chat channel trait and the message types that flow through it.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// Platform user identifier (a Discord snowflake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    /// Display name, used only for logging.
    pub name: String,
}

/// Where a message was posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContext {
    /// One-to-one channel between a user and the bot.
    Direct { channel_id: u64 },
    /// Shared channel inside a guild, with resolved display names.
    Guild {
        guild_id: u64,
        guild_name: String,
        channel_id: u64,
        channel_name: String,
    },
}

/// An inbound chat message. Owned by the channel; the relay only reads it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: u64,
    pub author: Author,
    pub content: String,
    pub context: MessageContext,
    /// Users named in the message.
    pub mentions: Vec<UserId>,
}

impl InboundMessage {
    /// A message delivered over a direct channel.
    pub fn direct(id: u64, author: Author, content: impl Into<String>) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            context: MessageContext::Direct { channel_id: 0 },
            mentions: Vec::new(),
        }
    }

    /// A message posted in a guild channel.
    pub fn guild(
        id: u64,
        author: Author,
        content: impl Into<String>,
        guild_name: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            context: MessageContext::Guild {
                guild_id: 0,
                guild_name: guild_name.into(),
                channel_id: 0,
                channel_name: channel_name.into(),
            },
            mentions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<UserId>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.context, MessageContext::Direct { .. })
    }
}

/// A chat platform connection.
///
/// Implementations own login/session handling and translate native
/// events into [`InboundMessage`]s.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Connect and start producing inbound messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// The bot's own user id, once the session is ready.
    fn bot_identity(&self) -> Option<UserId>;

    /// Resolves once the session is ready and [`bot_identity`](Self::bot_identity)
    /// is known.
    async fn wait_ready(&self) {}

    /// Post `text` into the direct channel the message came from.
    async fn send_direct(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError>;

    /// Post `text` as a threaded reply to the message.
    async fn send_reply(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError>;

    /// Send a private message to an arbitrary user (admin notifications).
    async fn notify_user(&self, user: UserId, text: &str) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
