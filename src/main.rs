use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use care_bot::bot::{BotDeps, BotService};
use care_bot::channels::{Channel, CliChannel, TelegramChannel};
use care_bot::config::BotConfig;
use care_bot::reminders::ReminderScheduler;
use care_bot::store::{LibSqlBackend, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("invalid configuration")?;

    // Initialize tracing; the file layer is only added when a log dir is set.
    let (file_writer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "care-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
        }))
        .init();

    eprintln!("🩺 Care Bot v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn RecordStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram {
        Some(telegram) => {
            eprintln!("   Channel: telegram");
            let channel = TelegramChannel::new(
                telegram.bot_token.expose_secret().to_string(),
                telegram.allowed_users.clone(),
            );
            if let Err(e) = channel.health_check().await {
                tracing::warn!("Telegram health check failed: {e}");
            }
            Arc::new(channel)
        }
        None => {
            eprintln!("   Channel: cli (set TELEGRAM_BOT_TOKEN to use Telegram)");
            eprintln!("   Type a message and press Enter. Ctrl+C to exit.\n");
            Arc::new(CliChannel::new())
        }
    };

    // ── Reminders ────────────────────────────────────────────────────────
    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::clone(&channel),
        Arc::clone(&store),
    ));

    let service = Arc::new(BotService::new(
        BotDeps {
            store,
            channel,
            scheduler,
        },
        config.reply_delay,
    ));

    service.run().await?;
    tracing::info!("Care bot stopped");
    Ok(())
}
