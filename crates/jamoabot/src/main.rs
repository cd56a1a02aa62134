use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use jamoa::cli::{Cli, Commands};
use jamoa::health::start_health_server;
use jamoa::keepalive::spawn_keepalive;
use jamoa::logging::init_logger;
use jamoa::telegram::handlers::{schema, HandlerDeps};
use jamoa::telegram::state::{ActorGate, StateStore};
use jamoa::telegram::{create_bot, setup_bot_commands};
use jamoacore::storage::db::encrypt_legacy_cards;
use jamoacore::storage::{create_pool, get_connection};
use jamoacore::{CardCipher, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load .env before the config is read.
    let _ = dotenv();
    let config = Config::from_env()?;
    init_logger(&config.log_file_path)?;

    match cli.command {
        Some(Commands::MigrateCards { dry_run }) => run_migrate_cards(&config, dry_run),
        Some(Commands::Run) | None => run_bot(config).await,
    }
}

/// Re-encrypt legacy plaintext card rows and exit.
fn run_migrate_cards(config: &Config, dry_run: bool) -> Result<()> {
    let cipher = CardCipher::new(config.encryption_key())?;
    let pool = create_pool(&config.database_path)?;
    let conn = get_connection(&pool)?;

    let count = encrypt_legacy_cards(&conn, &cipher, dry_run)?;
    if dry_run {
        log::info!("{} legacy card row(s) would be encrypted", count);
    } else {
        log::info!("Encrypted {} legacy card row(s)", count);
    }
    Ok(())
}

/// Run the Telegram bot.
async fn run_bot(config: Config) -> Result<()> {
    log::info!("Starting jamoa...");

    let config = Arc::new(config);
    let cipher = Arc::new(CardCipher::new(config.encryption_key())?);
    let db_pool = Arc::new(create_pool(&config.database_path)?);

    if config.super_admin_id == 0 {
        log::warn!("SUPER_ADMIN is not set; the /admin panel is disabled");
    }

    // One-time pass over rows written before encryption was introduced.
    // A failure here is not fatal; legacy rows stay readable raw.
    {
        let conn = get_connection(&db_pool)?;
        match encrypt_legacy_cards(&conn, &cipher, false) {
            Ok(0) => {}
            Ok(count) => log::info!("Encrypted {} legacy card row(s)", count),
            Err(e) => log::warn!("Legacy card migration failed: {}", e),
        }
    }

    let bot = create_bot(&config)?;
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();
    log::info!("Bot username: {:?}, Bot ID: {}", bot_username, me.id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    // Health endpoint and keep-alive self-ping for always-on hosts.
    if let Some(port) = config.health_port {
        tokio::spawn(async move {
            if let Err(e) = start_health_server(port).await {
                log::error!("Health server error: {}", e);
            }
        });
    }
    let shutdown = CancellationToken::new();
    let keepalive_handle = config
        .keepalive_url
        .clone()
        .map(|url| spawn_keepalive(url, shutdown.clone()));

    let deps = HandlerDeps::new(
        Arc::clone(&db_pool),
        Arc::clone(&config),
        Arc::clone(&cipher),
        Arc::new(StateStore::new()),
        Arc::new(ActorGate::new()),
        bot_username,
    );
    let handler = schema(deps);

    log::info!("Starting bot in long polling mode");
    let listener = teloxide::update_listeners::Polling::builder(bot.clone())
        .drop_pending_updates()
        .build();

    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    // The dispatcher returned (ctrl-c): stop background tasks cleanly.
    shutdown.cancel();
    if let Some(handle) = keepalive_handle {
        let _ = handle.await;
    }
    log::info!("Shutdown complete");
    Ok(())
}
