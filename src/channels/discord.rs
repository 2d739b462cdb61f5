//! Discord channel over the serenity gateway client.
//!
//! The gateway handler converts every message into an [`InboundMessage`]
//! (resolving guild and channel names through a shared [`NameCache`]) and
//! pushes it onto an mpsc queue exposed as a [`MessageStream`]. Sends go
//! through a separate REST client so they work from any task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{
    ChannelId, Client, Context, CreateMessage, EventHandler, GatewayIntents, GuildId, Http,
    Message, MessageId, Ready, ShardManager,
};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use crate::channels::names::{NameCache, NameFetcher, NameSource};
use crate::channels::{Author, ChatChannel, InboundMessage, MessageContext, MessageStream, UserId};
use crate::error::ChannelError;
use crate::logging::targets;

const NAME: &str = "discord";

/// Connects to Discord as a bot user.
pub struct DiscordChannel {
    token: SecretString,
    http: Arc<Http>,
    identity: watch::Sender<Option<UserId>>,
    shards: Mutex<Option<Arc<ShardManager>>>,
}

impl DiscordChannel {
    pub fn new(token: SecretString) -> Self {
        let http = Arc::new(Http::new(token.expose_secret()));
        let (identity, _) = watch::channel(None);
        Self {
            token,
            http,
            identity,
            shards: Mutex::new(None),
        }
    }

    /// Gateway intents needed to see guild and direct messages with content.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    async fn post(&self, channel: ChannelId, builder: CreateMessage) -> Result<(), ChannelError> {
        channel
            .send_message(&self.http, builder)
            .await
            .map(|_| ())
            .map_err(|e| send_failed(e.to_string()))
    }
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: NAME.to_string(),
        reason,
    }
}

/// Channel the message was posted in. Snowflakes are never zero.
fn channel_of(msg: &InboundMessage) -> Result<ChannelId, ChannelError> {
    let id = match msg.context {
        MessageContext::Direct { channel_id } | MessageContext::Guild { channel_id, .. } => {
            channel_id
        }
    };
    if id == 0 {
        return Err(send_failed(format!("message {} has no channel", msg.id)));
    }
    Ok(ChannelId::new(id))
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let handler = GatewayHandler {
            tx,
            identity: self.identity.clone(),
            guilds: NameCache::new(),
            channels: NameCache::new(),
        };

        let mut client = Client::builder(self.token.expose_secret(), Self::intents())
            .event_handler(handler)
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: NAME.to_string(),
                reason: e.to_string(),
            })?;

        *self.shards.lock().await = Some(Arc::clone(&client.shard_manager));

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(target: targets::BOBBIN, "Discord client stopped: {}", e);
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    fn bot_identity(&self) -> Option<UserId> {
        *self.identity.borrow()
    }

    async fn wait_ready(&self) {
        let mut rx = self.identity.subscribe();
        let _ = rx.wait_for(Option::is_some).await;
    }

    async fn send_direct(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError> {
        self.post(channel_of(msg)?, CreateMessage::new().content(text))
            .await
    }

    async fn send_reply(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError> {
        let channel = channel_of(msg)?;
        if msg.id == 0 {
            return self.post(channel, CreateMessage::new().content(text)).await;
        }
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel, MessageId::new(msg.id)));
        self.post(channel, builder).await
    }

    async fn notify_user(&self, user: UserId, text: &str) -> Result<(), ChannelError> {
        let dm = serenity::all::UserId::new(user.0)
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| send_failed(e.to_string()))?;
        self.post(dm.id, CreateMessage::new().content(text)).await
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        if let Some(shards) = self.shards.lock().await.take() {
            shards.shutdown_all().await;
        }
        Ok(())
    }
}

/// Gateway event handler.
struct GatewayHandler {
    tx: mpsc::UnboundedSender<InboundMessage>,
    identity: watch::Sender<Option<UserId>>,
    guilds: NameCache,
    channels: NameCache,
}

impl GatewayHandler {
    /// The bot's own posts never reach the relay, so they cost no name lookups.
    fn is_own(&self, author: u64) -> bool {
        is_own_message(*self.identity.borrow(), author)
    }

    async fn convert(&self, ctx: &Context, msg: &Message) -> InboundMessage {
        let author = Author {
            id: UserId(msg.author.id.get()),
            name: msg.author.tag(),
        };

        let context = match msg.guild_id {
            None => MessageContext::Direct {
                channel_id: msg.channel_id.get(),
            },
            Some(guild_id) => {
                let guild_source = match guild_id.name(&ctx.cache) {
                    Some(name) => NameSource::Cached {
                        id: guild_id.get(),
                        name,
                    },
                    None => NameSource::Fetchable { id: guild_id.get() },
                };
                let guild_name = self
                    .guilds
                    .resolve(guild_source, &GuildNames(ctx.clone()))
                    .await;
                let channel_name = self
                    .channels
                    .resolve(
                        NameSource::Fetchable {
                            id: msg.channel_id.get(),
                        },
                        &ChannelNames(ctx.clone()),
                    )
                    .await;

                MessageContext::Guild {
                    guild_id: guild_id.get(),
                    guild_name,
                    channel_id: msg.channel_id.get(),
                    channel_name,
                }
            }
        };

        InboundMessage {
            id: msg.id.get(),
            author,
            content: msg.content.clone(),
            context,
            mentions: msg.mentions.iter().map(|u| UserId(u.id.get())).collect(),
        }
    }
}

#[async_trait]
impl EventHandler for GatewayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            target: targets::BOBBIN,
            guilds = ready.guilds.len(),
            "We have logged in as {}",
            ready.user.tag()
        );
        self.identity.send_replace(Some(UserId(ready.user.id.get())));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if self.is_own(msg.author.id.get()) {
            return;
        }
        let inbound = self.convert(&ctx, &msg).await;
        if self.tx.send(inbound).is_err() {
            warn!(target: targets::BOBBIN, msg_id = msg.id.get(), "Relay stopped, dropping message");
        }
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        debug!(target: targets::BOBBIN, guild_count = guilds.len(), "Discord cache ready");
    }
}

fn is_own_message(identity: Option<UserId>, author: u64) -> bool {
    identity == Some(UserId(author))
}

/// Guild names: cache first, then REST.
struct GuildNames(Context);

#[async_trait]
impl NameFetcher for GuildNames {
    async fn fetch_name(&self, id: u64) -> Option<String> {
        let guild = GuildId::new(id);
        if let Some(name) = guild.name(&self.0.cache) {
            return Some(name);
        }
        guild.to_partial_guild(&self.0.http).await.ok().map(|g| g.name)
    }
}

/// Channel names, via the cache or REST.
struct ChannelNames(Context);

#[async_trait]
impl NameFetcher for ChannelNames {
    async fn fetch_name(&self, id: u64) -> Option<String> {
        ChannelId::new(id).name(&self.0).await.ok()
    }
}
