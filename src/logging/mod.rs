//! Logging setup.
//!
//! Two independent namespaces:
//! - announcements (`bobbin`, `bobbin::message::incoming::*`,
//!   `bobbin::message::outgoing*`): who, what, when
//! - content (`bobbin::message::content::*`): full message and reply bodies
//!
//! Announcements go to a rolling `bobbin.log` and stderr, filtered by
//! `RUST_LOG`. Content never reaches those; it has its own files whose
//! levels come from [`LogConfig`](crate::config::LogConfig).

pub mod notify;

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{Directive, EnvFilter, LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use crate::config::BotConfig;
use crate::error::ConfigError;

pub use notify::{AdminNotifier, AdminNotifyLayer, DirectMessageSink, NotificationSink};

/// Log targets used across the crate.
pub mod targets {
    /// General bot lifecycle and warnings.
    pub const BOBBIN: &str = "bobbin";
    pub const ACCEPT: &str = "bobbin::message::incoming::accept";
    pub const REJECT: &str = "bobbin::message::incoming::reject";
    pub const OUTGOING: &str = "bobbin::message::outgoing";
    pub const APOLOGY: &str = "bobbin::message::outgoing::apology";

    /// Root of the content namespace.
    pub const CONTENT: &str = "bobbin::message::content";
    pub const CHANNEL_CONTENT: &str = "bobbin::message::content::channel";
    pub const CHANNEL_IN: &str = "bobbin::message::content::channel::incoming";
    pub const CHANNEL_OUT: &str = "bobbin::message::content::channel::outgoing";
    pub const DM_CONTENT: &str = "bobbin::message::content::dm";
    pub const DM_IN: &str = "bobbin::message::content::dm::incoming";
    pub const DM_OUT: &str = "bobbin::message::content::dm::outgoing";

    /// Admin notification delivery. Never forwarded to the admin.
    pub const NOTIFY: &str = "bobbin::notify";
}

/// Number of rotated files kept per log.
const MAX_LOG_FILES: usize = 5;

/// Keeps the non-blocking writers flushing. Hold until shutdown.
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init(config: &BotConfig, notifier: &AdminNotifier) -> Result<LogGuards, ConfigError> {
    let log = &config.logging;
    let msgs_dir = log.dir.join("msgs");
    let mut guards = Vec::new();

    let (main_writer, guard) = tracing_appender::non_blocking(rolling(&log.dir, "bobbin")?);
    guards.push(guard);

    let dm_layer = if log.dm_content != LevelFilter::OFF {
        let (writer, guard) = tracing_appender::non_blocking(rolling(&msgs_dir, "dms")?);
        guards.push(guard);
        Some(file_layer(writer).with_filter(
            Targets::new().with_target(targets::DM_CONTENT, log.dm_content),
        ))
    } else {
        None
    };

    let channel_layer = if log.channel_content != LevelFilter::OFF {
        let (writer, guard) = tracing_appender::non_blocking(rolling(&msgs_dir, "channels")?);
        guards.push(guard);
        Some(file_layer(writer).with_filter(
            Targets::new().with_target(targets::CHANNEL_CONTENT, log.channel_content),
        ))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer(main_writer).with_filter(announcement_filter()?))
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(announcement_filter()?),
        )
        .with(dm_layer)
        .with(channel_layer)
        .with(AdminNotifyLayer::new(config.notify_admin.clone(), notifier.clone()))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::info!(
        target: targets::BOBBIN,
        dir = %log.dir.display(),
        dm_content = %log.dm_content,
        channel_content = %log.channel_content,
        "Logging initialized"
    );

    Ok(LogGuards { _guards: guards })
}

/// `RUST_LOG` (default `info`) with the content namespace switched off.
fn announcement_filter() -> Result<EnvFilter, ConfigError> {
    let hide_content: Directive = format!("{}=off", targets::CONTENT)
        .parse()
        .map_err(|e| ConfigError::Logging(format!("bad content directive: {e}")))?;

    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(hide_content))
}

fn rolling(dir: &Path, prefix: &str) -> Result<RollingFileAppender, ConfigError> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| ConfigError::Logging(format!("{}: {e}", dir.display())))
}

fn file_layer<S>(
    writer: NonBlocking,
) -> fmt::Layer<S, fmt::format::DefaultFields, fmt::format::Format, NonBlocking>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_ansi(false).with_writer(writer)
}
