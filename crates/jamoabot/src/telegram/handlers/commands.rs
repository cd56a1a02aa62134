//! /start and /help command implementations.

use indoc::indoc;
use teloxide::prelude::*;
use teloxide::types::Message;

use super::{join, orgs, HandlerDeps, HandlerError};

/// Handle /start. A 16-char deep-link payload routes straight into the
/// join workflow; a bare /start is the universal escape hatch: it
/// clears any conversation state and shows the main menu.
pub(super) async fn handle_start(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    payload: Option<String>,
) -> Result<(), HandlerError> {
    if let Some(code) = payload {
        return join::handle_join_code(bot, msg, deps, actor_id, &code, true).await;
    }

    deps.states.clear(actor_id);
    orgs::send_main_menu(bot, msg.chat.id).await
}

/// Handle /help.
pub(super) async fn handle_help(bot: &Bot, msg: &Message) -> Result<(), HandlerError> {
    let text = indoc! {"
        I keep track of teams, their participants and card numbers.

        • Create a team and share its invite link
        • Joining via a link asks the team owner for approval
        • Owners add participants with one or more 16-digit cards
        • Type @ + my name in any chat to search participants inline

        /start — main menu
        /help — this message
    "};
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}
