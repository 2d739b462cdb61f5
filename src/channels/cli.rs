//! CLI channel: stdin/stdout loop for running the relay without Discord.
//!
//! Lines are collected until a blank line (or EOF) and delivered as one
//! direct message, so multi-line BASIC programs can be pasted as-is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Author, ChatChannel, InboundMessage, MessageStream, UserId};
use crate::error::ChannelError;

/// Identity the bot uses on the CLI.
pub const CLI_BOT_ID: UserId = UserId(0);

/// Identity of the person at the terminal.
pub const CLI_USER_ID: UserId = UserId(1);

/// A local channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    next_id: Arc<AtomicU64>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

fn local_user() -> Author {
    Author {
        id: CLI_USER_ID,
        name: "local-user".to_string(),
    }
}

#[async_trait]
impl ChatChannel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let next_id = Arc::clone(&self.next_id);

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();
            let mut pending = String::new();

            eprintln!("Enter a program, then a blank line to run it.");
            eprint!("> ");

            loop {
                let line = match lines.next_line().await {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        None
                    }
                };

                let finished = match &line {
                    Some(l) if !l.trim().is_empty() => {
                        pending.push_str(l);
                        pending.push('\n');
                        continue;
                    }
                    Some(_) => false,
                    None => true,
                };

                if !pending.is_empty() {
                    let id = next_id.fetch_add(1, Ordering::Relaxed) + 1;
                    let msg = InboundMessage::direct(id, local_user(), std::mem::take(&mut pending));
                    if tx.send(msg).is_err() {
                        break;
                    }
                } else if !finished {
                    eprint!("> ");
                }

                if finished {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    fn bot_identity(&self) -> Option<UserId> {
        Some(CLI_BOT_ID)
    }

    async fn send_direct(&self, _msg: &InboundMessage, text: &str) -> Result<(), ChannelError> {
        println!("\n{}\n", text);
        eprint!("> ");
        Ok(())
    }

    async fn send_reply(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError> {
        println!("\n(reply to {}) {}\n", msg.id, text);
        eprint!("> ");
        Ok(())
    }

    async fn notify_user(&self, user: UserId, text: &str) -> Result<(), ChannelError> {
        eprintln!("[to {}] {}", user, text);
        Ok(())
    }
}
