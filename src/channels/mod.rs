//! Channel abstraction for chat I/O.

pub mod channel;
pub mod cli;
pub mod discord;
pub mod names;

pub use channel::*;
pub use cli::CliChannel;
pub use discord::DiscordChannel;
pub use names::{NameCache, NameFetcher, NameSource};
