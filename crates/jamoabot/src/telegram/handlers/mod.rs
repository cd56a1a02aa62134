//! Handler modules, shared dependencies and the dispatcher schema.

pub mod admin;
pub mod commands;
pub mod inline;
pub mod join;
pub mod orgs;
pub mod participants;
pub mod schema;

use std::sync::Arc;

use teloxide::types::{CallbackQueryId, ChatId, Message, MessageId};

use jamoacore::storage::db::DbPool;
use jamoacore::{CardCipher, Config};

use super::state::{ActorGate, StateStore};

pub use schema::schema;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers, constructed once at startup and
/// cloned into every endpoint. No ambient globals.
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub config: Arc<Config>,
    pub cipher: Arc<CardCipher>,
    pub states: Arc<StateStore>,
    pub gate: Arc<ActorGate>,
    pub bot_username: Option<String>,
}

impl HandlerDeps {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: Arc<Config>,
        cipher: Arc<CardCipher>,
        states: Arc<StateStore>,
        gate: Arc<ActorGate>,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            db_pool,
            config,
            cipher,
            states,
            gate,
            bot_username,
        }
    }

    /// Deep-link URL carrying a team's unique_id. Without a known bot
    /// username there is no URL to build; the raw id still works as
    /// typed input.
    pub fn invite_link(&self, unique_id: &str) -> Option<String> {
        self.bot_username
            .as_deref()
            .map(|username| format!("https://t.me/{}?start={}", username, unique_id))
    }
}

/// The acting user behind a message. Falls back to the chat id, which
/// equals the user id in the private chats this bot lives in.
pub(crate) fn actor_id_of(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .and_then(|u| i64::try_from(u.id.0).ok())
        .unwrap_or(msg.chat.id.0)
}

/// Everything a callback flow needs to answer the query and edit the
/// originating message.
pub(crate) struct CallbackCtx {
    pub id: CallbackQueryId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub actor_id: i64,
}
