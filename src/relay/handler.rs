//! Drives one inbound message end to end.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::channels::{ChatChannel, InboundMessage, MessageContext};
use crate::config::BotConfig;
use crate::error::Error;
use crate::logging::targets;
use crate::relay::acceptability::{Acceptability, classify};
use crate::relay::extract::extract;
use crate::relay::format::format_reply;
use crate::relay::runner::Emulator;

/// Sent in place of a reply when handling fails after acceptance.
pub const APOLOGY: &str = "[[Sorry, this bot experienced an internal error]]";

/// What happened to a message that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The bot's own message.
    Ignored,
    /// Classified as not for us; nothing was sent.
    Rejected(Acceptability),
    /// A reply was sent.
    Replied { truncated: bool },
}

/// Classifies, runs and answers inbound messages.
pub struct Relay {
    config: Arc<BotConfig>,
    emulator: Arc<dyn Emulator>,
}

impl Relay {
    pub fn new(config: Arc<BotConfig>, emulator: Arc<dyn Emulator>) -> Self {
        Self { config, emulator }
    }

    /// Consume the channel's message stream until it ends or Ctrl+C.
    ///
    /// Each message is handled on its own task so a slow emulator run does
    /// not hold up the rest. When the stream ends, in-flight messages are
    /// finished before the channel shuts down; Ctrl+C aborts them instead,
    /// which also kills their emulator children.
    pub async fn run(self: Arc<Self>, channel: Arc<dyn ChatChannel>) -> Result<(), Error> {
        let mut messages = channel.start().await?;
        let mut in_flight = JoinSet::new();
        info!(target: targets::BOBBIN, channel = channel.name(), "Relay listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!(
                        target: targets::BOBBIN,
                        in_flight = in_flight.len(),
                        "Ctrl+C received, shutting down..."
                    );
                    in_flight.abort_all();
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
                msg = messages.next() => match msg {
                    Some(m) => m,
                    None => {
                        info!(
                            target: targets::BOBBIN,
                            in_flight = in_flight.len(),
                            "Message stream ended, shutting down..."
                        );
                        break;
                    }
                }
            };

            let relay = Arc::clone(&self);
            let channel = Arc::clone(&channel);
            in_flight.spawn(async move {
                // Failures are logged inside handle.
                let _ = relay.handle(channel.as_ref(), &message).await;
            });
        }

        while in_flight.join_next().await.is_some() {}

        channel.shutdown().await?;
        Ok(())
    }

    /// Handle one message.
    ///
    /// Once a message is accepted, any failure sends [`APOLOGY`] through the
    /// same primitive a reply would use, then returns the error.
    pub async fn handle(
        &self,
        channel: &dyn ChatChannel,
        msg: &InboundMessage,
    ) -> Result<Outcome, Error> {
        let bot = channel.bot_identity();
        if bot == Some(msg.author.id) {
            return Ok(Outcome::Ignored);
        }

        let acc = classify(msg, bot, &self.config);
        if acc.is_rejected() {
            return Ok(Outcome::Rejected(acc));
        }

        log_received(msg, acc);

        match self.respond(channel, msg).await {
            Ok(truncated) => Ok(Outcome::Replied { truncated }),
            Err(e) => {
                self.apologize(channel, msg).await;
                error!(
                    target: targets::BOBBIN,
                    msg_id = msg.id,
                    author_id = %msg.author.id,
                    "Failed to handle message: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Extract, run, format and send. Returns whether the reply was truncated.
    async fn respond(&self, channel: &dyn ChatChannel, msg: &InboundMessage) -> Result<bool, Error> {
        let params = extract(&msg.content, &self.config.attract_tag);
        if params.is_degraded() {
            warn!(
                target: targets::BOBBIN,
                msg_id = msg.id,
                "Message #{} contained non-ASCII chars! Removed invalid chars",
                msg.id
            );
        }
        let output = self.emulator.run(&params).await?;
        let reply = format_reply(&output);

        match &msg.context {
            MessageContext::Direct { .. } => {
                info!(
                    target: targets::OUTGOING,
                    "Replying to {}'s DM (msgid {}).",
                    msg.author.name,
                    msg.id
                );
                debug!(
                    target: targets::DM_OUT,
                    "To uid {}:\nOUTPUT\n{}\n",
                    msg.author.id,
                    reply.content
                );
                channel.send_direct(msg, &reply.content).await?;
            }
            MessageContext::Guild {
                guild_name,
                channel_name,
                ..
            } => {
                info!(
                    target: targets::OUTGOING,
                    "Replying to {},msgid {}.",
                    msg.author.name,
                    msg.id
                );
                debug!(
                    target: targets::CHANNEL_OUT,
                    "{}#{}, to uid {}:\nOUTPUT\n{}\n",
                    guild_name,
                    channel_name,
                    msg.author.id,
                    reply.content
                );
                channel.send_reply(msg, &reply.content).await?;
            }
        }

        if reply.truncated {
            info!(target: targets::OUTGOING, msg_id = msg.id, "Output was truncated");
        }

        Ok(reply.truncated)
    }

    /// Best effort: a failed apology is logged, never returned.
    async fn apologize(&self, channel: &dyn ChatChannel, msg: &InboundMessage) {
        let sent = if msg.is_direct() {
            info!(
                target: targets::APOLOGY,
                "Apologizing to {}'s DM (msgid {}).",
                msg.author.name,
                msg.id
            );
            channel.send_direct(msg, APOLOGY).await
        } else {
            info!(
                target: targets::APOLOGY,
                "Apologizing to {},msgid {}.",
                msg.author.name,
                msg.id
            );
            channel.send_reply(msg, APOLOGY).await
        };

        if let Err(e) = sent {
            error!(target: targets::APOLOGY, msg_id = msg.id, "Apology could not be sent: {}", e);
        }
    }
}

/// Announce an accepted message and log its content to the matching namespace.
fn log_received(msg: &InboundMessage, acc: Acceptability) {
    match &msg.context {
        MessageContext::Direct { .. } => {
            info!(
                target: targets::ACCEPT,
                "{}: {} ({}) msgid {}.",
                acc,
                msg.author.name,
                msg.author.id,
                msg.id
            );
            debug!(
                target: targets::DM_IN,
                "From uid {}:\nINPUT\n{}\n",
                msg.author.id,
                msg.content
            );
        }
        MessageContext::Guild {
            guild_name,
            channel_name,
            ..
        } => {
            info!(
                target: targets::ACCEPT,
                "{}#{} {} ({}) {} msg ({})",
                guild_name,
                channel_name,
                msg.author.name,
                msg.author.id,
                acc,
                msg.id
            );
            debug!(
                target: targets::CHANNEL_IN,
                "{}#{}, from uid {}:\nINPUT\n{}\n",
                guild_name,
                channel_name,
                msg.author.id,
                msg.content
            );
        }
    }
}
