//! Join workflow: deep link or typed team id, owner approval, and the
//! approve/deny decision round trip.
//!
//! No pending-request table: a request lives only in the notification
//! message sent to the owner. A lost message means the requester starts
//! over, which keeps the store free of stale requests.

use teloxide::prelude::*;
use teloxide::types::Message;

use jamoacore::error::AppError;
use jamoacore::policy;
use jamoacore::storage::db::{self, Organization};
use jamoacore::storage::{get_connection, DbConnection};

use super::orgs::{deny, not_found};
use super::{CallbackCtx, HandlerDeps, HandlerError};
use crate::telegram::notifications;
use crate::telegram::state::ConversationState;

/// Expected length of a team's unique id.
const UNIQUE_ID_LEN: usize = 16;

/// What a join attempt resolves to, before any messaging happens.
#[derive(Debug)]
pub(crate) enum JoinOutcome {
    /// No team carries this id.
    UnknownId,
    /// Already a member; nothing to do, nobody to notify.
    AlreadyMember(Organization),
    /// Requester is the owner or the super-admin: grant immediately.
    Granted(Organization),
    /// A plain user: the owner must approve.
    NeedsApproval(Organization),
}

/// Resolves a join attempt against the store. Pure decision; callers
/// do the messaging.
pub(crate) fn evaluate_join(
    conn: &DbConnection,
    super_admin_id: i64,
    actor_id: i64,
    unique_id: &str,
) -> Result<JoinOutcome, AppError> {
    let Some(org) = db::get_org_by_unique_id(conn, unique_id)? else {
        return Ok(JoinOutcome::UnknownId);
    };
    if db::is_member(conn, actor_id, org.id)? {
        return Ok(JoinOutcome::AlreadyMember(org));
    }
    if org.owner_id == actor_id || policy::is_super_admin(super_admin_id, actor_id) {
        return Ok(JoinOutcome::Granted(org));
    }
    Ok(JoinOutcome::NeedsApproval(org))
}

/// Entry point for both the /start deep link and typed input in the
/// JoiningOrg state.
pub(crate) async fn handle_join_code(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    code: &str,
    from_deep_link: bool,
) -> Result<(), HandlerError> {
    let code = code.trim();
    if code.len() != UNIQUE_ID_LEN {
        if from_deep_link {
            deps.states.clear(actor_id);
            bot.send_message(msg.chat.id, "Invalid link. Team not found.").await?;
        } else {
            // Typed input: re-prompt, state preserved.
            bot.send_message(msg.chat.id, "The team id must be 16 characters. Try again:")
                .await?;
        }
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    let outcome = evaluate_join(&conn, deps.config.super_admin_id, actor_id, code)?;

    match outcome {
        JoinOutcome::UnknownId => {
            drop(conn);
            deps.states.clear(actor_id);
            bot.send_message(msg.chat.id, "Team not found.").await?;
        }
        JoinOutcome::AlreadyMember(org) => {
            drop(conn);
            deps.states.clear(actor_id);
            bot.send_message(msg.chat.id, format!("You are already a member of «{}».", org.name))
                .await?;
        }
        JoinOutcome::Granted(org) => {
            // Self-approval bypass: owner and super-admin skip the round trip.
            let full_name = msg.from.as_ref().map(|u| u.full_name());
            let username = msg.from.as_ref().and_then(|u| u.username.clone());
            db::add_member(&conn, actor_id, org.id, full_name.as_deref(), username.as_deref())?;
            drop(conn);
            deps.states.clear(actor_id);
            log::info!("actor {} joined org {} without approval", actor_id, org.id);
            bot.send_message(msg.chat.id, format!("✅ You joined «{}».", org.name))
                .await?;
        }
        JoinOutcome::NeedsApproval(org) => {
            drop(conn);
            deps.states.clear(actor_id);
            let label = msg
                .from
                .as_ref()
                .map(|u| u.full_name())
                .unwrap_or_else(|| actor_id.to_string());

            // Best-effort: an undeliverable owner notification is not an
            // error for the requester, but don't claim it was sent.
            if notifications::notify_join_request(bot, org.owner_id, actor_id, &label, &org).await {
                bot.send_message(msg.chat.id, format!("Your request to join «{}» was sent to the owner.", org.name))
                    .await?;
            } else {
                bot.send_message(
                    msg.chat.id,
                    format!("Could not reach the owner of «{}» right now. Try again later.", org.name),
                )
                .await?;
            }
        }
    }
    Ok(())
}

/// "Join a team" from the main menu: ask for the 16-char id.
pub(super) async fn cb_join_prompt(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    deps.states.set(ctx.actor_id, ConversationState::JoiningOrg);
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, "Send the 16-character team id from your invite:")
        .await?;
    Ok(())
}

/// Approve or deny from the owner's notification message.
///
/// The clicker's rights are re-verified now, since ownership may have
/// changed since the request was sent. On approval the requester's
/// display name is fetched fresh rather than reused from the request.
pub(super) async fn cb_join_decision(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    approve: bool,
    requester_id: i64,
    org_id: i64,
) -> Result<(), HandlerError> {
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

    if approve {
        let (full_name, username) = notifications::resolve_display_name(bot, requester_id).await;
        let conn = get_connection(&deps.db_pool)?;
        db::add_member(&conn, requester_id, org_id, full_name.as_deref(), username.as_deref())?;
        drop(conn);

        log::info!("actor {} approved {} into org {}", ctx.actor_id, requester_id, org_id);
        notifications::notify_join_approved(bot, requester_id, &org.name).await;

        let shown = full_name.unwrap_or_else(|| requester_id.to_string());
        let _ = bot.answer_callback_query(ctx.id.clone()).text("Approved").await;
        bot.edit_message_text(
            ctx.chat_id,
            ctx.message_id,
            format!("✅ {} is now a member of «{}».", shown, org.name),
        )
        .await?;
    } else {
        log::info!("actor {} denied {} for org {}", ctx.actor_id, requester_id, org_id);
        notifications::notify_join_denied(bot, requester_id, &org.name).await;

        let _ = bot.answer_callback_query(ctx.id.clone()).text("Denied").await;
        bot.edit_message_text(
            ctx.chat_id,
            ctx.message_id,
            format!("❌ Join request from id {} was denied.", requester_id),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamoacore::storage::db::DbPool;
    use jamoacore::storage::create_pool;

    use tempfile::TempDir;

    const SUPER_ADMIN: i64 = 900;

    fn test_pool() -> (TempDir, DbPool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    #[test]
    fn unknown_id_is_terminal() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        assert!(matches!(
            evaluate_join(&conn, SUPER_ADMIN, 42, "0000000000000000").unwrap(),
            JoinOutcome::UnknownId
        ));
    }

    #[test]
    fn plain_user_needs_approval() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let org = db::create_org(&conn, "Team X", 1).unwrap();
        db::add_member(&conn, 1, org.id, None, None).unwrap();

        assert!(matches!(
            evaluate_join(&conn, SUPER_ADMIN, 42, &org.unique_id).unwrap(),
            JoinOutcome::NeedsApproval(_)
        ));
    }

    #[test]
    fn rejoin_is_idempotent() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let org = db::create_org(&conn, "Team X", 1).unwrap();
        db::add_member(&conn, 42, org.id, None, None).unwrap();

        // Already a member: no grant, no notification path.
        assert!(matches!(
            evaluate_join(&conn, SUPER_ADMIN, 42, &org.unique_id).unwrap(),
            JoinOutcome::AlreadyMember(_)
        ));
        assert_eq!(db::get_org_members(&conn, org.id).unwrap().len(), 1);
    }

    #[test]
    fn owner_and_super_admin_bypass_approval() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let org = db::create_org(&conn, "Team X", 1).unwrap();

        assert!(matches!(
            evaluate_join(&conn, SUPER_ADMIN, 1, &org.unique_id).unwrap(),
            JoinOutcome::Granted(_)
        ));
        assert!(matches!(
            evaluate_join(&conn, SUPER_ADMIN, SUPER_ADMIN, &org.unique_id).unwrap(),
            JoinOutcome::Granted(_)
        ));
    }
}
