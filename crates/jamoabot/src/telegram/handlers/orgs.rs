//! Team management flows: create, rename, delete, invite link,
//! member list and removal.

use teloxide::prelude::*;
use teloxide::types::Message;

use jamoacore::error::AppError;
use jamoacore::policy;
use jamoacore::storage::db;
use jamoacore::storage::get_connection;

use super::{CallbackCtx, HandlerDeps, HandlerError};
use crate::telegram::menu;
use crate::telegram::state::ConversationState;

/// Greeting + main menu as a fresh message.
pub(crate) async fn send_main_menu(bot: &Bot, chat_id: ChatId) -> Result<(), HandlerError> {
    bot.send_message(chat_id, "What shall we do?")
        .reply_markup(menu::main_menu())
        .await?;
    Ok(())
}

/// Answers the callback with a lightweight denial notice, or stays
/// silent when the actor has no visibility into the resource at all.
pub(super) async fn deny(bot: &Bot, ctx: &CallbackCtx, visible: bool) -> Result<(), HandlerError> {
    let request = bot.answer_callback_query(ctx.id.clone());
    let _ = if visible { request.text("⛔ Not allowed").await } else { request.await };
    Ok(())
}

/// "Not found" notice plus a defensive state reset: the entity was
/// deleted underneath the conversation.
pub(super) async fn not_found(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, what: &str) -> Result<(), HandlerError> {
    deps.states.clear(ctx.actor_id);
    let _ = bot
        .answer_callback_query(ctx.id.clone())
        .text(format!("{} not found", what))
        .await;
    Ok(())
}

// --- Text-input flows ---

/// CreatingOrg: the message text is the new team's name.
pub(super) async fn handle_new_org_name(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
) -> Result<(), HandlerError> {
    let name = msg.text().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "The team name cannot be empty. Send a name:")
            .await?;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    let org = db::create_org(&conn, &name, actor_id)?;

    // The owner is a member from the first moment.
    let full_name = msg.from.as_ref().map(|u| u.full_name());
    let username = msg.from.as_ref().and_then(|u| u.username.clone());
    db::add_member(&conn, actor_id, org.id, full_name.as_deref(), username.as_deref())?;
    drop(conn);

    deps.states.clear(actor_id);
    log::info!("actor {} created org {} «{}»", actor_id, org.id, org.name);

    let link_line = match deps.invite_link(&org.unique_id) {
        Some(link) => format!("Invite link:\n{}", link),
        None => format!("Invite id: {}", org.unique_id),
    };
    bot.send_message(msg.chat.id, format!("✅ Team «{}» created!\n\n{}", org.name, link_line))
        .reply_markup(menu::org_detail(org.id, true))
        .await?;
    Ok(())
}

/// RenamingOrg: the message text is the replacement name. Ownership is
/// re-verified now, not when the button was pressed.
pub(super) async fn handle_rename_input(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    org_id: i64,
) -> Result<(), HandlerError> {
    let name = msg.text().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        bot.send_message(msg.chat.id, "The team name cannot be empty. Send a name:")
            .await?;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    if !policy::can_manage(&conn, deps.config.super_admin_id, actor_id, org_id)? {
        bot.send_message(msg.chat.id, "⛔ Only the team owner can rename it.").await?;
        return Ok(());
    }

    match db::rename_org(&conn, org_id, &name) {
        Ok(()) => {}
        Err(AppError::NotFound(_)) => {
            drop(conn);
            deps.states.clear(actor_id);
            bot.send_message(msg.chat.id, "Team not found.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    drop(conn);

    deps.states.clear(actor_id);
    bot.send_message(msg.chat.id, format!("✅ Team renamed to «{}».", name))
        .reply_markup(menu::org_detail(org_id, true))
        .await?;
    Ok(())
}

// --- Callback flows ---

pub(super) async fn cb_main_menu(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    deps.states.clear(ctx.actor_id);
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, "What shall we do?")
        .reply_markup(menu::main_menu())
        .await?;
    Ok(())
}

pub(super) async fn cb_new_org(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    deps.states.set(ctx.actor_id, ConversationState::CreatingOrg);
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, "Send a name for the new team:")
        .await?;
    Ok(())
}

pub(super) async fn cb_my_orgs(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    deps.states.clear(ctx.actor_id);
    let _ = bot.answer_callback_query(ctx.id.clone()).await;

    let conn = get_connection(&deps.db_pool)?;
    let orgs = db::get_member_orgs(&conn, ctx.actor_id)?;
    drop(conn);

    if orgs.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "You have no teams yet.")
            .reply_markup(menu::main_menu())
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Your teams:")
            .reply_markup(menu::my_orgs_list(&orgs))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_org_view(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    deps.states.clear(ctx.actor_id);

    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;
    drop(conn);

    if !manageable && !member {
        return deny(bot, ctx, false).await;
    }

    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("📁 {}", org.name))
        .reply_markup(menu::org_detail(org.id, manageable))
        .await?;
    Ok(())
}

pub(super) async fn cb_org_link(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;
    drop(conn);

    if !manageable {
        return deny(bot, ctx, member).await;
    }

    let link_line = match deps.invite_link(&org.unique_id) {
        Some(link) => format!("Share this link to invite members:\n{}", link),
        None => format!("Share this id to invite members:\n{}", org.unique_id),
    };
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("📁 {}\n\n{}", org.name, link_line))
        .reply_markup(menu::back_to_org(org.id))
        .await?;
    Ok(())
}

pub(super) async fn cb_rename_org(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;
    drop(conn);

    if !manageable {
        return deny(bot, ctx, member).await;
    }

    deps.states.set(ctx.actor_id, ConversationState::RenamingOrg { org_id });
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("Send the new name for «{}»:", org.name))
        .await?;
    Ok(())
}

pub(super) async fn cb_delete_org(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;

    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }

    match db::delete_org(&conn, org_id) {
        Ok(()) => {}
        Err(AppError::NotFound(_)) => {
            drop(conn);
            return not_found(bot, ctx, deps, "Team").await;
        }
        Err(e) => return Err(e.into()),
    }

    deps.states.clear(ctx.actor_id);
    log::info!("actor {} deleted org {}", ctx.actor_id, org_id);
    let _ = bot.answer_callback_query(ctx.id.clone()).text("Team deleted").await;

    // Destructive action: refresh the team list right away.
    let orgs = db::get_member_orgs(&conn, ctx.actor_id)?;
    drop(conn);
    if orgs.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "You have no teams yet.")
            .reply_markup(menu::main_menu())
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Your teams:")
            .reply_markup(menu::my_orgs_list(&orgs))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_leave_org(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };

    if org.owner_id == ctx.actor_id {
        drop(conn);
        let _ = bot
            .answer_callback_query(ctx.id.clone())
            .text("The owner cannot leave their own team")
            .await;
        return Ok(());
    }

    db::remove_member(&conn, ctx.actor_id, org_id)?;
    let orgs = db::get_member_orgs(&conn, ctx.actor_id)?;
    drop(conn);

    let _ = bot.answer_callback_query(ctx.id.clone()).text("You left the team").await;
    if orgs.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "You have no teams yet.")
            .reply_markup(menu::main_menu())
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Your teams:")
            .reply_markup(menu::my_orgs_list(&orgs))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_list_members(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, org_id: i64) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;

    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }

    let members = db::get_org_members(&conn, org_id)?;
    drop(conn);

    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("Members ({}):", members.len()))
        .reply_markup(menu::org_members_list(&members, &org))
        .await?;
    Ok(())
}

/// Removes a member. The owner row is refused here as well, not just
/// hidden in the keyboard; stale keyboards must not bypass the rule.
pub(super) async fn cb_remove_member(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    member_id: i64,
    org_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(org) = db::get_org(&conn, org_id)? else {
        return not_found(bot, ctx, deps, "Team").await;
    };
    let manageable = policy::can_manage(&conn, deps.config.super_admin_id, ctx.actor_id, org_id)?;
    let member = policy::is_member(&conn, ctx.actor_id, org_id)?;

    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }

    if member_id == org.owner_id {
        drop(conn);
        let _ = bot
            .answer_callback_query(ctx.id.clone())
            .text("The owner cannot be removed")
            .await;
        return Ok(());
    }

    db::remove_member(&conn, member_id, org_id)?;
    let members = db::get_org_members(&conn, org_id)?;
    drop(conn);

    log::info!("actor {} removed member {} from org {}", ctx.actor_id, member_id, org_id);
    let _ = bot.answer_callback_query(ctx.id.clone()).text("Member removed").await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("Members ({}):", members.len()))
        .reply_markup(menu::org_members_list(&members, &org))
        .await?;
    Ok(())
}
