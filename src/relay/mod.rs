//! Message relay between chat and the emulator.
//!
//! Every inbound message flows through:
//! 1. `acceptability::classify()`: is it addressed to us, from an allowed place?
//! 2. `extract::extract()`: strip addressing and fences, pick the machine
//! 3. `runner::Emulator::run()`: one emulator subprocess run
//! 4. `format::format_reply()`: fence, escape and truncate the output
//!
//! `handler::Relay` drives the steps and owns the reply/apology side effects.

pub mod acceptability;
pub mod extract;
pub mod format;
pub mod handler;
pub mod runner;

pub use acceptability::{Acceptability, classify};
pub use extract::{RunParameters, extract};
pub use format::{Reply, format_reply};
pub use handler::{APOLOGY, Outcome, Relay};
pub use runner::{BobbinRunner, Emulator};
