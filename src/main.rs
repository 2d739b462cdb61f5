use std::sync::Arc;

use bobbin_bot::channels::{ChatChannel, CliChannel, DiscordChannel, UserId};
use bobbin_bot::config::BotConfig;
use bobbin_bot::logging::{self, AdminNotifier, DirectMessageSink, targets};
use bobbin_bot::relay::{BobbinRunner, Relay};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = BotConfig::from_env()?;

    let notifier = AdminNotifier::new();
    let _log_guards = logging::init(&config, &notifier)?;

    tracing::info!(target: targets::BOBBIN, "BOBBIN BOT STARTING");

    let channel: Arc<dyn ChatChannel> = match config.discord_token.take() {
        Some(token) => Arc::new(DiscordChannel::new(token)),
        None => {
            eprintln!("🍎 Bobbin Bot v{}", env!("CARGO_PKG_VERSION"));
            eprintln!("   BOBBIN_DISCORD_TOKEN not set, running on the command line.");
            eprintln!("   Emulator: {}\n", config.emulator.program.display());
            Arc::new(CliChannel::new())
        }
    };

    if let Some(admin) = config.admin_id {
        let channel = Arc::clone(&channel);
        let notifier = notifier.clone();
        tokio::spawn(async move {
            channel.wait_ready().await;
            let sink = DirectMessageSink::new(Arc::clone(&channel), UserId(admin));
            notifier.attach(Arc::new(sink));
            tracing::info!(target: targets::BOBBIN, admin, "Admin notifications enabled");
        });
    }

    let emulator = Arc::new(BobbinRunner::new(config.emulator.clone()));
    let relay = Arc::new(Relay::new(Arc::new(config), emulator));

    let result = relay.run(channel).await;

    notifier.detach();
    tracing::info!(target: targets::BOBBIN, "BOBBIN BOT SHUTTING DOWN");

    result?;
    Ok(())
}
