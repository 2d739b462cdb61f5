//! Decides whether an inbound message is addressed to the bot.
//!
//! Classification order, first match wins:
//! - direct channel → accepted, no further checks
//! - bot named in the mentions → accepted if the channel is allowed
//! - body starts with the attract tag → accepted if the channel is allowed
//! - anything else → chaff

use std::fmt;

use crate::channels::{InboundMessage, MessageContext, UserId};
use crate::config::BotConfig;
use crate::logging::targets;

/// Values at or above this line are accepted.
pub const ACCEPT_LINE: u8 = 100;

/// Why a message is (or isn't) handled.
///
/// The numeric gap between the reject and accept tiers leaves room for new
/// reasons without moving the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Acceptability {
    /// Nothing to do with us.
    RejectChaff = 0,
    /// Addressed to us, but the channel is not on the allow-list.
    RejectChannel = 1,
    /// Reserved for blocked users.
    RejectUser = 2,

    /// Body starts with the attract tag.
    AcceptTagged = ACCEPT_LINE,
    /// The bot is in the mention set.
    AcceptMentioned = 101,
    /// Delivered over a one-to-one channel.
    AcceptDirectMessage = 102,
}

impl Acceptability {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn is_accepted(self) -> bool {
        self.value() >= ACCEPT_LINE
    }

    pub fn is_rejected(self) -> bool {
        !self.is_accepted()
    }

    /// Short label used in announcement logs.
    pub fn label(self) -> &'static str {
        match self {
            Acceptability::RejectChaff => "CHAFF",
            Acceptability::RejectChannel => "UNACCEPTABLE CHANNEL",
            Acceptability::RejectUser => "BLOCKED USER",
            Acceptability::AcceptTagged => "TAGGED",
            Acceptability::AcceptMentioned => "MENTIONED",
            Acceptability::AcceptDirectMessage => "DIRECT MESSAGE",
        }
    }
}

impl fmt::Display for Acceptability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify `message` for a bot identified as `bot`.
///
/// Emits one rejection event on `bobbin::message::incoming::reject` when an
/// addressed message arrives in a channel that is not allowed.
pub fn classify(message: &InboundMessage, bot: Option<UserId>, config: &BotConfig) -> Acceptability {
    let (guild_name, channel_name) = match &message.context {
        MessageContext::Direct { .. } => return Acceptability::AcceptDirectMessage,
        MessageContext::Guild {
            guild_name,
            channel_name,
            ..
        } => (guild_name, channel_name),
    };

    let acc = if bot.is_some_and(|id| message.mentions.contains(&id)) {
        Acceptability::AcceptMentioned
    } else if message.content.trim().starts_with(config.attract_tag.as_str()) {
        Acceptability::AcceptTagged
    } else {
        return Acceptability::RejectChaff;
    };

    if config.channel_okay(guild_name, channel_name) {
        return acc;
    }

    tracing::info!(
        target: targets::REJECT,
        guild = %guild_name,
        channel = %channel_name,
        author = %message.author.name,
        author_id = %message.author.id,
        msg_id = message.id,
        "{}#{} {} ({}) attract in UNACCEPTABLE channel, msg ({})",
        guild_name,
        channel_name,
        message.author.name,
        message.author.id,
        message.id,
    );
    Acceptability::RejectChannel
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing::{Event, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;
    use crate::channels::Author;

    const BOT: UserId = UserId(900);

    fn config() -> BotConfig {
        BotConfig {
            allowed_channels: vec!["Retro#apple2".into(), "Hobby#*".into()],
            ..BotConfig::default()
        }
    }

    fn author() -> Author {
        Author {
            id: UserId(7),
            name: "micah".into(),
        }
    }

    fn in_channel(guild: &str, channel: &str, content: &str) -> InboundMessage {
        InboundMessage::guild(55, author(), content, guild, channel)
    }

    /// Counts events emitted on one target.
    struct TargetCounter {
        target: &'static str,
        hits: Arc<AtomicUsize>,
    }

    impl<S: Subscriber> Layer<S> for TargetCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target() == self.target {
                self.hits.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_rejections(f: impl FnOnce() -> Acceptability) -> (Acceptability, usize) {
        let hits = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(TargetCounter {
            target: targets::REJECT,
            hits: Arc::clone(&hits),
        });
        let acc = tracing::subscriber::with_default(subscriber, f);
        (acc, hits.load(Ordering::SeqCst))
    }

    #[test]
    fn accept_boundary() {
        assert!(Acceptability::RejectChaff.is_rejected());
        assert!(Acceptability::RejectChannel.is_rejected());
        assert!(Acceptability::RejectUser.is_rejected());
        assert!(Acceptability::AcceptTagged.is_accepted());
        assert!(Acceptability::AcceptMentioned.is_accepted());
        assert!(Acceptability::AcceptDirectMessage.is_accepted());
        assert!(Acceptability::RejectUser < Acceptability::AcceptTagged);
        assert_eq!(Acceptability::AcceptDirectMessage.value(), 102);
    }

    #[test]
    fn direct_message_always_accepted() {
        let cfg = BotConfig::default();
        for content in ["", "hello", "!bobbin PRINT 1", "```\n10 GOTO 10\n```"] {
            let msg = InboundMessage::direct(1, author(), content);
            assert_eq!(
                classify(&msg, Some(BOT), &cfg),
                Acceptability::AcceptDirectMessage
            );
        }
    }

    #[test]
    fn direct_message_accepted_without_bot_identity() {
        let msg = InboundMessage::direct(1, author(), "hi");
        assert_eq!(
            classify(&msg, None, &BotConfig::default()),
            Acceptability::AcceptDirectMessage
        );
    }

    #[test]
    fn unaddressed_is_chaff() {
        let (acc, rejections) = count_rejections(|| {
            classify(&in_channel("Elsewhere", "general", "lunch?"), Some(BOT), &config())
        });
        assert_eq!(acc, Acceptability::RejectChaff);
        assert_eq!(rejections, 0);
    }

    #[test]
    fn tag_must_be_a_prefix() {
        let msg = in_channel("Retro", "apple2", "try !bobbin later");
        assert_eq!(classify(&msg, Some(BOT), &config()), Acceptability::RejectChaff);
    }

    #[test]
    fn tag_is_case_sensitive() {
        let msg = in_channel("Retro", "apple2", "!BOBBIN\nPRINT 1");
        assert_eq!(classify(&msg, Some(BOT), &config()), Acceptability::RejectChaff);
    }

    #[test]
    fn tagged_after_leading_whitespace() {
        let msg = in_channel("Retro", "apple2", "   !bobbin\nPRINT 1");
        assert_eq!(classify(&msg, Some(BOT), &config()), Acceptability::AcceptTagged);
    }

    #[test]
    fn mention_wins_over_tag() {
        let msg = in_channel("Retro", "apple2", "!bobbin hi").with_mentions(vec![UserId(3), BOT]);
        assert_eq!(
            classify(&msg, Some(BOT), &config()),
            Acceptability::AcceptMentioned
        );
    }

    #[test]
    fn mention_of_someone_else_is_chaff() {
        let msg = in_channel("Retro", "apple2", "hey").with_mentions(vec![UserId(3)]);
        assert_eq!(classify(&msg, Some(BOT), &config()), Acceptability::RejectChaff);
    }

    #[test]
    fn guild_wildcard_allows_any_channel() {
        let msg = in_channel("Hobby", "random", "!bobbin\nPRINT 1");
        assert_eq!(classify(&msg, Some(BOT), &config()), Acceptability::AcceptTagged);
    }

    #[test]
    fn disallowed_channel_rejected_with_one_event() {
        let (acc, rejections) = count_rejections(|| {
            let msg = in_channel("Retro", "general", "!bobbin\nPRINT 1");
            classify(&msg, Some(BOT), &config())
        });
        assert_eq!(acc, Acceptability::RejectChannel);
        assert_eq!(rejections, 1);
    }

    #[test]
    fn mentioned_in_disallowed_channel_rejected() {
        let (acc, rejections) = count_rejections(|| {
            let msg = in_channel("Other", "apple2", "run this").with_mentions(vec![BOT]);
            classify(&msg, Some(BOT), &config())
        });
        assert_eq!(acc, Acceptability::RejectChannel);
        assert_eq!(rejections, 1);
    }
}
