//! Super-admin panel: all teams, blocklist management.
//!
//! Every entry point re-checks `is_super_admin` and stays silent for
//! anyone else. These callbacks should never be visible to other
//! users in the first place, so there is nothing to explain.

use teloxide::prelude::*;
use teloxide::types::Message;

use jamoacore::error::AppError;
use jamoacore::policy;
use jamoacore::storage::db;
use jamoacore::storage::get_connection;

use super::{CallbackCtx, HandlerDeps, HandlerError};
use crate::telegram::menu;
use crate::telegram::state::ConversationState;

/// /admin opens the panel for the super-admin and does nothing for
/// anyone else.
pub(super) async fn handle_admin_command(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
) -> Result<(), HandlerError> {
    if !policy::is_super_admin(deps.config.super_admin_id, actor_id) {
        return Ok(());
    }
    deps.states.clear(actor_id);
    bot.send_message(msg.chat.id, "Super admin panel:")
        .reply_markup(menu::super_admin_menu())
        .await?;
    Ok(())
}

/// BlockingUser: the message text is the Telegram id to block.
pub(super) async fn handle_block_input(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
) -> Result<(), HandlerError> {
    if !policy::is_super_admin(deps.config.super_admin_id, actor_id) {
        deps.states.clear(actor_id);
        return Ok(());
    }

    let text = msg.text().unwrap_or_default().trim();
    let Ok(target_id) = text.parse::<i64>() else {
        bot.send_message(msg.chat.id, "Error! The Telegram ID must be a number. Try again:")
            .await?;
        return Ok(());
    };

    if !policy::can_block(deps.config.super_admin_id, target_id) {
        deps.states.clear(actor_id);
        bot.send_message(msg.chat.id, "You cannot block yourself!")
            .reply_markup(menu::super_admin_menu())
            .await?;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    db::block_user(&conn, target_id)?;
    drop(conn);

    deps.states.clear(actor_id);
    log::info!("super-admin blocked user {}", target_id);
    bot.send_message(msg.chat.id, format!("User {} blocked.", target_id))
        .reply_markup(menu::super_admin_menu())
        .await?;
    Ok(())
}

/// Routes every `sa_*` callback.
pub(super) async fn handle_admin_callback(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    parts: &[&str],
) -> Result<(), HandlerError> {
    if !policy::is_super_admin(deps.config.super_admin_id, ctx.actor_id) {
        return Ok(());
    }

    match parts {
        ["sa_back"] => {
            deps.states.clear(ctx.actor_id);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            bot.edit_message_text(ctx.chat_id, ctx.message_id, "Super admin panel:")
                .reply_markup(menu::super_admin_menu())
                .await?;
        }
        ["sa_all_orgs"] => {
            deps.states.clear(ctx.actor_id);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            show_all_orgs(bot, ctx, deps).await?;
        }
        ["sa_org", id] => {
            let Ok(org_id) = id.parse::<i64>() else {
                let _ = bot.answer_callback_query(ctx.id.clone()).await;
                return Ok(());
            };
            let conn = get_connection(&deps.db_pool)?;
            let Some(org) = db::get_org(&conn, org_id)? else {
                drop(conn);
                let _ = bot.answer_callback_query(ctx.id.clone()).text("Team not found").await;
                return Ok(());
            };
            drop(conn);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            bot.edit_message_text(
                ctx.chat_id,
                ctx.message_id,
                format!("Team: {}\nUnique ID: {}\nOwner ID: {}", org.name, org.unique_id, org.owner_id),
            )
            .reply_markup(menu::sa_org_detail(org_id))
            .await?;
        }
        ["sa_participants", id] => {
            let Ok(org_id) = id.parse::<i64>() else {
                let _ = bot.answer_callback_query(ctx.id.clone()).await;
                return Ok(());
            };
            let conn = get_connection(&deps.db_pool)?;
            let participants = db::get_participants(&conn, org_id)?;
            drop(conn);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            if participants.is_empty() {
                bot.edit_message_text(ctx.chat_id, ctx.message_id, "No participants.")
                    .reply_markup(menu::sa_org_detail(org_id))
                    .await?;
            } else {
                bot.edit_message_text(ctx.chat_id, ctx.message_id, "Participants:")
                    .reply_markup(menu::participant_list(&participants, org_id))
                    .await?;
            }
        }
        ["sa_members", id] => {
            let Ok(org_id) = id.parse::<i64>() else {
                let _ = bot.answer_callback_query(ctx.id.clone()).await;
                return Ok(());
            };
            let conn = get_connection(&deps.db_pool)?;
            let Some(org) = db::get_org(&conn, org_id)? else {
                drop(conn);
                let _ = bot.answer_callback_query(ctx.id.clone()).text("Team not found").await;
                return Ok(());
            };
            let members = db::get_org_members(&conn, org_id)?;
            drop(conn);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            if members.is_empty() {
                bot.edit_message_text(ctx.chat_id, ctx.message_id, "No members.")
                    .reply_markup(menu::sa_org_detail(org_id))
                    .await?;
            } else {
                bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("Members ({}):", members.len()))
                    .reply_markup(menu::org_members_list(&members, &org))
                    .await?;
            }
        }
        ["sa_delete_org", id] => {
            let Ok(org_id) = id.parse::<i64>() else {
                let _ = bot.answer_callback_query(ctx.id.clone()).await;
                return Ok(());
            };
            let conn = get_connection(&deps.db_pool)?;
            match db::delete_org(&conn, org_id) {
                Ok(()) => {
                    log::info!("super-admin deleted org {}", org_id);
                    let _ = bot.answer_callback_query(ctx.id.clone()).text("Team deleted!").await;
                }
                Err(AppError::NotFound(_)) => {
                    let _ = bot.answer_callback_query(ctx.id.clone()).text("Team not found").await;
                }
                Err(e) => return Err(e.into()),
            }
            drop(conn);
            show_all_orgs(bot, ctx, deps).await?;
        }
        ["sa_blocked_users"] => {
            deps.states.clear(ctx.actor_id);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            show_blocked_users(bot, ctx, deps).await?;
        }
        ["sa_unblock", tid] => {
            let Ok(target_id) = tid.parse::<i64>() else {
                let _ = bot.answer_callback_query(ctx.id.clone()).await;
                return Ok(());
            };
            let conn = get_connection(&deps.db_pool)?;
            db::unblock_user(&conn, target_id)?;
            drop(conn);
            log::info!("super-admin unblocked user {}", target_id);
            let _ = bot.answer_callback_query(ctx.id.clone()).text("User unblocked!").await;
            show_blocked_users(bot, ctx, deps).await?;
        }
        ["sa_block_user"] => {
            deps.states.set(ctx.actor_id, ConversationState::BlockingUser);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            bot.edit_message_text(ctx.chat_id, ctx.message_id, "Send the Telegram ID to block:")
                .await?;
        }
        _ => {
            log::warn!("Unrecognized admin callback: {:?}", parts);
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
        }
    }
    Ok(())
}

async fn show_all_orgs(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let orgs = db::get_all_orgs(&conn)?;
    drop(conn);

    if orgs.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "No teams yet.")
            .reply_markup(menu::super_admin_menu())
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "All teams:")
            .reply_markup(menu::sa_org_list(&orgs))
            .await?;
    }
    Ok(())
}

async fn show_blocked_users(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let users = db::get_blocked_users(&conn)?;
    drop(conn);

    if users.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "No blocked users.")
            .reply_markup(menu::super_admin_menu())
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Blocked users (tap to unblock):")
            .reply_markup(menu::blocked_users_list(&users))
            .await?;
    }
    Ok(())
}
