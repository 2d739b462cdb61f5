//! Configuration types.
//!
//! A single [`BotConfig`] is built at startup and shared by `Arc` with the
//! classifier, the relay and the logging setup. Values come from an
//! optional JSON file named by `BOBBIN_CONFIG`, then environment overrides.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

use crate::error::ConfigError;

/// Prefix that addresses the bot in a shared channel.
pub const DEFAULT_ATTRACT_TAG: &str = "!bobbin";

/// Hard ceiling on emulator output kept in memory.
///
/// This only guards against runaway output; the user-visible truncation
/// happens later when the reply is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimit {
    pub max_bytes: usize,
    pub max_lines: usize,
}

impl Default for OutputLimit {
    fn default() -> Self {
        Self {
            max_bytes: 5000,
            max_lines: 500,
        }
    }
}

/// How the external emulator is invoked.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Executable to launch.
    pub program: PathBuf,
    /// Value passed to `--max-frames`.
    pub max_frames: u32,
    /// Wall-clock limit before the child is killed.
    pub timeout: Duration,
    pub output_limit: OutputLimit,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bobbin"),
            max_frames: 7200,
            timeout: Duration::from_secs(30),
            output_limit: OutputLimit::default(),
        }
    }
}

/// Where log files go and which content logs are enabled.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    /// Level for direct-message content logging.
    pub dm_content: LevelFilter,
    /// Level for guild channel content logging.
    pub channel_content: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            dm_content: LevelFilter::DEBUG,
            channel_content: LevelFilter::OFF,
        }
    }
}

/// Bot configuration.
#[derive(Debug)]
pub struct BotConfig {
    /// Text prefix that addresses the bot.
    pub attract_tag: String,
    /// `guild#channel` or `guild#*` entries permitted outside of DMs.
    pub allowed_channels: Vec<String>,
    /// Discord bot token. Without one the CLI channel is used.
    pub discord_token: Option<SecretString>,
    /// User that receives admin notifications.
    pub admin_id: Option<u64>,
    /// Log targets whose events are forwarded to the admin.
    pub notify_admin: Vec<String>,
    pub emulator: EmulatorConfig,
    pub logging: LogConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            attract_tag: DEFAULT_ATTRACT_TAG.to_string(),
            allowed_channels: Vec::new(),
            discord_token: None,
            admin_id: None,
            notify_admin: Vec::new(),
            emulator: EmulatorConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl BotConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup("BOBBIN_CONFIG") {
            Some(path) if !path.trim().is_empty() => ConfigFile::load(Path::new(path.trim()))?,
            _ => ConfigFile::default(),
        };

        let mut config = Self::default();
        config.apply_file(file)?;
        config.apply_env(&lookup)?;
        Ok(config)
    }

    /// Returns true if `guild#channel` is approved for messages, either
    /// directly or through a `guild#*` wildcard entry.
    pub fn channel_okay(&self, guild: &str, channel: &str) -> bool {
        let qualified = format!("{guild}#{channel}");
        let wildcard = format!("{guild}#*");
        self.allowed_channels
            .iter()
            .any(|entry| *entry == qualified || *entry == wildcard)
    }

    fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(tag) = file.attract_tag {
            self.attract_tag = tag;
        }
        if let Some(channels) = file.allowed_channels {
            self.allowed_channels = channels;
        }
        if let Some(token) = file.discord_token.filter(|t| !t.is_empty()) {
            self.discord_token = Some(SecretString::from(token));
        }
        if file.admin_id.is_some() {
            self.admin_id = file.admin_id;
        }
        if let Some(targets) = file.notify_admin {
            self.notify_admin = targets;
        }

        let emulator = file.emulator;
        if let Some(program) = emulator.program {
            self.emulator.program = program;
        }
        if let Some(frames) = emulator.max_frames {
            self.emulator.max_frames = frames;
        }
        if let Some(secs) = emulator.timeout_secs {
            self.emulator.timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = emulator.output_max_bytes {
            self.emulator.output_limit.max_bytes = bytes;
        }
        if let Some(lines) = emulator.output_max_lines {
            self.emulator.output_limit.max_lines = lines;
        }

        let logging = file.logging;
        if let Some(dir) = logging.dir {
            self.logging.dir = dir;
        }
        if let Some(level) = logging.dm_content {
            self.logging.dm_content = parse_value("logging.dm_content", &level)?;
        }
        if let Some(level) = logging.channel_content {
            self.logging.channel_content = parse_value("logging.channel_content", &level)?;
        }

        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tag) = lookup("BOBBIN_ATTRACT_TAG").filter(|t| !t.trim().is_empty()) {
            self.attract_tag = tag.trim().to_string();
        }
        if let Some(list) = lookup("BOBBIN_ALLOWED_CHANNELS") {
            self.allowed_channels = split_list(&list);
        }
        if let Some(token) = lookup("BOBBIN_DISCORD_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.discord_token = Some(SecretString::from(token.trim().to_string()));
        }
        if let Some(id) = parse_var(lookup, "BOBBIN_ADMIN_ID")? {
            self.admin_id = Some(id);
        }
        if let Some(list) = lookup("BOBBIN_NOTIFY_ADMIN") {
            self.notify_admin = split_list(&list);
        }

        if let Some(program) = lookup("BOBBIN_PATH").filter(|p| !p.trim().is_empty()) {
            self.emulator.program = PathBuf::from(program.trim());
        }
        if let Some(frames) = parse_var(lookup, "BOBBIN_MAX_FRAMES")? {
            self.emulator.max_frames = frames;
        }
        if let Some(secs) = parse_var(lookup, "BOBBIN_TIMEOUT_SECS")? {
            self.emulator.timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var(lookup, "BOBBIN_OUTPUT_MAX_BYTES")? {
            self.emulator.output_limit.max_bytes = bytes;
        }
        if let Some(lines) = parse_var(lookup, "BOBBIN_OUTPUT_MAX_LINES")? {
            self.emulator.output_limit.max_lines = lines;
        }

        if let Some(dir) = lookup("BOBBIN_LOG_DIR").filter(|d| !d.trim().is_empty()) {
            self.logging.dir = PathBuf::from(dir.trim());
        }
        if let Some(level) = parse_var(lookup, "BOBBIN_DM_CONTENT_LOG")? {
            self.logging.dm_content = level;
        }
        if let Some(level) = parse_var(lookup, "BOBBIN_CHANNEL_CONTENT_LOG")? {
            self.logging.channel_content = level;
        }

        Ok(())
    }
}

// ── Config file ─────────────────────────────────────────────────────

/// On-disk JSON shape. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    attract_tag: Option<String>,
    allowed_channels: Option<Vec<String>>,
    discord_token: Option<String>,
    admin_id: Option<u64>,
    notify_admin: Option<Vec<String>>,
    emulator: EmulatorFile,
    logging: LoggingFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct EmulatorFile {
    program: Option<PathBuf>,
    max_frames: Option<u32>,
    timeout_secs: Option<u64>,
    output_max_bytes: Option<usize>,
    output_max_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoggingFile {
    dir: Option<PathBuf>,
    dm_content: Option<String>,
    channel_content: Option<String>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a comma-separated list, dropping empty entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw).map(Some),
        _ => Ok(None),
    }
}
