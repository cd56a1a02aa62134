//! Bot initialization and command definitions.

use std::time::Duration;

use jamoacore::Config;
use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "I can:")]
pub enum Command {
    #[command(description = "show what the bot can do")]
    Help,
    #[command(description = "super-admin panel")]
    Admin,
}

/// Network timeout for outbound Bot API calls.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a Bot instance from the configured token, with a bounded
/// HTTP timeout and an optional custom Bot API server URL.
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let token = config
        .bot_token()
        .ok_or_else(|| anyhow::anyhow!("BOT_TOKEN environment variable not set"))?;

    let client = ClientBuilder::new().timeout(API_TIMEOUT).build()?;
    let bot = Bot::with_client(token, client);

    let bot = if let Some(ref bot_api_url) = config.bot_api_url {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
        bot.set_api_url(url)
    } else {
        bot
    };

    Ok(bot)
}

/// Registers the user-facing commands in the Telegram UI. `/admin` is
/// deliberately left out of the visible list.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "main menu"),
        BotCommand::new("help", "show what the bot can do"),
    ])
    .await?;

    Ok(())
}
