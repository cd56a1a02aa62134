//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod menu;
pub mod notifications;
pub mod state;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use teloxide::Bot;

use teloxide::types::InlineKeyboardButton;

/// Shorthand for an inline callback button.
pub(crate) fn cb(text: impl Into<String>, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.into(), data.into())
}
