use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use roost::bot::{schema, BotEngine, Database, HandlerDeps, TelegramClient};
use roost::config::Config;
use roost::telegram_log::TelegramLogLayer;
use roost::web::{self, WebState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "roost.json".to_string());
    let config = Config::load(&config_path)?;

    let bot = Bot::new(&config.telegram_bot_token);
    let _guard = init_logging(&config, &bot)?;

    info!("🚀 Starting roost...");
    info!("Loaded config from {config_path}");
    info!("Owner IDs: {:?}", config.owner_ids);

    let db = Arc::new(Database::open(&config.database_path())?);

    let telegram = TelegramClient::new(bot.clone());
    if let Err(e) = telegram.register_commands().await {
        warn!("{e}");
    }

    let owners = config.owner_ids.iter().map(|id| id.0 as i64);
    let deps = Arc::new(HandlerDeps {
        engine: BotEngine::new(db.clone(), owners),
        telegram,
    });

    let shutdown = CancellationToken::new();
    let web_task = if config.web_enabled {
        let listener = web::bind(config.web_addr).await?;
        let state = WebState::new(db.clone());
        Some(tokio::spawn(web::run(listener, state, shutdown.clone())))
    } else {
        info!("Web endpoint disabled");
        None
    };

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped, shutting down");
    shutdown.cancel();
    if let Some(task) = web_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Web endpoint error: {e:#}"),
            Err(e) => error!("Web endpoint task failed: {e}"),
        }
    }

    Ok(())
}

/// Stdout + file logging, plus the Telegram layer when `log_chat_id` is set.
/// The returned guard flushes the file writer on drop.
fn init_logging(config: &Config, bot: &Bot) -> anyhow::Result<WorkerGuard> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("roost.log"))
        .context("failed to open log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let telegram_layer = config
        .log_chat_id
        .map(|chat_id| TelegramLogLayer::new(bot.clone(), chat_id));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(env_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
        .with(telegram_layer)
        .init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
