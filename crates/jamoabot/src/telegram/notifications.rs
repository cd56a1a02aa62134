//! Cross-actor notifications for the join workflow.
//!
//! Everything here is best-effort: a failed delivery is logged and the
//! initiating actor never sees it as an error. No pending-request
//! table exists: the request state lives entirely in the message sent
//! to the owner.

use teloxide::prelude::*;

use jamoacore::storage::db::Organization;

use super::menu;

/// Sends the owner an approval prompt for a join request. Returns
/// whether the notification was delivered.
pub async fn notify_join_request(
    bot: &Bot,
    owner_id: i64,
    requester_id: i64,
    requester_label: &str,
    org: &Organization,
) -> bool {
    let text = format!(
        "🔔 Join request\n\nUser: {} (id {})\nTeam: {}",
        requester_label, requester_id, org.name
    );
    match bot
        .send_message(ChatId(owner_id), text)
        .reply_markup(menu::join_request(requester_id, org.id))
        .await
    {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Failed to deliver join request for org {} to owner {}: {}", org.id, owner_id, e);
            false
        }
    }
}

pub async fn notify_join_approved(bot: &Bot, requester_id: i64, org_name: &str) {
    let text = format!("✅ You were accepted into «{}».", org_name);
    if let Err(e) = bot.send_message(ChatId(requester_id), text).await {
        log::warn!("Failed to notify user {} about approval: {}", requester_id, e);
    }
}

pub async fn notify_join_denied(bot: &Bot, requester_id: i64, org_name: &str) {
    let text = format!("❌ Your request to join «{}» was denied.", org_name);
    if let Err(e) = bot.send_message(ChatId(requester_id), text).await {
        log::warn!("Failed to notify user {} about denial: {}", requester_id, e);
    }
}

/// Fetches an actor's current display name and username, fresh from
/// Telegram. Falls back to (None, None) when the lookup fails; cached
/// display fields degrade to the raw id rather than blocking the flow.
pub async fn resolve_display_name(bot: &Bot, telegram_id: i64) -> (Option<String>, Option<String>) {
    match bot.get_chat(ChatId(telegram_id)).await {
        Ok(chat) => {
            let full_name = match (chat.first_name(), chat.last_name()) {
                (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                (Some(first), None) => Some(first.to_string()),
                _ => None,
            };
            let username = chat.username().map(|u| u.to_string());
            (full_name, username)
        }
        Err(e) => {
            log::warn!("Failed to resolve display name for {}: {}", telegram_id, e);
            (None, None)
        }
    }
}
