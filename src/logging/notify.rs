//! Forwarding selected log events to the bot admin.
//!
//! [`AdminNotifyLayer`] picks events by target and hands a formatted line to
//! an [`AdminNotifier`]. Until a [`NotificationSink`] is attached (the chat
//! session is ready) those lines are dropped.

use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::channels::{ChatChannel, UserId};
use crate::error::ChannelError;
use crate::logging::targets;

/// Longest notification sent in one message.
const MAX_NOTIFICATION_CHARS: usize = 1900;

/// Destination for admin notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), ChannelError>;
}

/// Sends notifications as direct messages to the admin user.
pub struct DirectMessageSink {
    channel: Arc<dyn ChatChannel>,
    admin: UserId,
}

impl DirectMessageSink {
    pub fn new(channel: Arc<dyn ChatChannel>, admin: UserId) -> Self {
        Self { channel, admin }
    }
}

#[async_trait]
impl NotificationSink for DirectMessageSink {
    async fn notify(&self, text: &str) -> Result<(), ChannelError> {
        let text: String = text.chars().take(MAX_NOTIFICATION_CHARS).collect();
        self.channel.notify_user(self.admin, &text).await
    }
}

/// Handle shared between the logging layer and the running bot.
#[derive(Clone, Default)]
pub struct AdminNotifier {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl AdminNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering records to `sink`. Replaces any previous sink.
    pub fn attach(&self, sink: Arc<dyn NotificationSink>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        if let Ok(mut slot) = self.tx.lock() {
            *slot = Some(tx);
        }

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = sink.notify(&record).await {
                    tracing::warn!(target: targets::NOTIFY, "Admin notification failed: {}", e);
                }
            }
        })
    }

    /// Stop delivering; later records are dropped.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.tx.lock() {
            *slot = None;
        }
    }

    fn forward(&self, record: String) {
        if let Ok(slot) = self.tx.lock() {
            if let Some(tx) = slot.as_ref() {
                let _ = tx.send(record);
            }
        }
    }
}

/// Layer that forwards events on the configured targets to the admin.
pub struct AdminNotifyLayer {
    prefixes: Vec<String>,
    notifier: AdminNotifier,
}

impl AdminNotifyLayer {
    pub fn new(prefixes: Vec<String>, notifier: AdminNotifier) -> Self {
        Self { prefixes, notifier }
    }

    /// `target` equals a prefix or sits below it in the `::` hierarchy.
    fn matches(&self, target: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            target == prefix
                || target
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

impl<S: Subscriber> Layer<S> for AdminNotifyLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target() == targets::NOTIFY || !self.matches(meta.target()) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        self.notifier
            .forward(visitor.render(*meta.level(), meta.target()));
    }
}

/// Collects an event's message and fields into one line.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
}

impl RecordVisitor {
    fn render(self, level: Level, target: &str) -> String {
        format!("[{:<5}] {target}: {}{}", level.as_str(), self.message, self.fields)
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn records(&self) -> Vec<String> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, text: &str) -> Result<(), ChannelError> {
            self.records.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn layer(prefixes: &[&str], notifier: &AdminNotifier) -> AdminNotifyLayer {
        AdminNotifyLayer::new(
            prefixes.iter().map(|p| p.to_string()).collect(),
            notifier.clone(),
        )
    }

    async fn wait_for(sink: &RecordingSink, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.records().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notification not delivered");
    }

    #[test]
    fn prefix_matching() {
        let l = layer(&["bobbin::message::incoming"], &AdminNotifier::new());
        assert!(l.matches("bobbin::message::incoming"));
        assert!(l.matches("bobbin::message::incoming::reject"));
        assert!(!l.matches("bobbin::message::incomingx"));
        assert!(!l.matches("bobbin::message"));
        assert!(!l.matches("serenity::gateway"));
    }

    #[tokio::test]
    async fn dropped_before_attach() {
        let notifier = AdminNotifier::new();
        let subscriber =
            tracing_subscriber::registry().with(layer(&[targets::REJECT], &notifier));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: targets::REJECT, "nobody listening");

        let sink = Arc::new(RecordingSink::default());
        let _task = notifier.attach(Arc::clone(&sink) as Arc<dyn NotificationSink>);
        tracing::info!(target: targets::REJECT, "after attach");

        wait_for(&sink, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("after attach"));
    }

    #[tokio::test]
    async fn forwards_matching_events_once_attached() {
        let notifier = AdminNotifier::new();
        let sink = Arc::new(RecordingSink::default());
        let _task = notifier.attach(Arc::clone(&sink) as Arc<dyn NotificationSink>);

        let subscriber =
            tracing_subscriber::registry().with(layer(&[targets::REJECT], &notifier));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: targets::ACCEPT, "not forwarded");
            tracing::info!(target: targets::REJECT, guild = "Retro", "bad channel");
        });

        wait_for(&sink, 1).await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].starts_with("[INFO "));
        assert!(records[0].contains("bobbin::message::incoming::reject: bad channel"));
        assert!(records[0].contains("guild=Retro"));
    }

    #[tokio::test]
    async fn notify_target_never_forwarded() {
        let notifier = AdminNotifier::new();
        let sink = Arc::new(RecordingSink::default());
        let _task = notifier.attach(Arc::clone(&sink) as Arc<dyn NotificationSink>);

        let subscriber = tracing_subscriber::registry().with(layer(&["bobbin"], &notifier));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: targets::NOTIFY, "delivery failed");
            tracing::warn!(target: targets::BOBBIN, "real problem");
        });

        wait_for(&sink, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("real problem"));
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let notifier = AdminNotifier::new();
        let sink = Arc::new(RecordingSink::default());
        let _task = notifier.attach(Arc::clone(&sink) as Arc<dyn NotificationSink>);
        notifier.detach();

        let subscriber = tracing_subscriber::registry().with(layer(&["bobbin"], &notifier));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: targets::BOBBIN, "after detach");
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.records().is_empty());
    }
}
