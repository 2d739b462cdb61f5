//! Bobbin Bot: relays chat messages to the bobbin Apple II emulator.

pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
