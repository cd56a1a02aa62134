//! Dispatcher schema and handler chain builders.
//!
//! The same handler tree serves production and tests. Routing rules:
//! free text goes to the actor's current conversation state first;
//! callbacks are matched on their `verb[:id[:id]]` token; everything
//! for one actor runs under that actor's gate, so two updates from the
//! same user can never interleave state reads and writes.

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use jamoacore::policy;
use jamoacore::storage::get_connection;

use super::{actor_id_of, admin, commands, inline, join, orgs, participants, CallbackCtx, HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::state::ConversationState;

/// Creates the main dispatcher schema for the bot.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_start = deps.clone();
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps.clone();
    let deps_inline = deps;

    dptree::entry()
        // /start must run before the Command filter: it may carry a
        // deep-link payload the Command enum doesn't model.
        .branch(start_handler(deps_start))
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
        .branch(inline_query_handler(deps_inline))
}

/// Handler for /start, with or without a deep-link payload.
fn start_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| text.starts_with("/start")).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let actor_id = actor_id_of(&msg);
                let _guard = deps.gate.acquire(actor_id).await;

                let conn = get_connection(&deps.db_pool)?;
                if policy::is_blocked(&conn, actor_id)? {
                    return Ok(());
                }
                drop(conn);

                let payload = msg
                    .text()
                    .and_then(|text| text.split_whitespace().nth(1))
                    .map(|s| s.to_string());

                commands::handle_start(&bot, &msg, &deps, actor_id, payload).await
            }
        })
}

/// Handler for the declared bot commands (/help, /admin).
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);

                let actor_id = actor_id_of(&msg);
                let _guard = deps.gate.acquire(actor_id).await;

                let conn = get_connection(&deps.db_pool)?;
                if policy::is_blocked(&conn, actor_id)? {
                    return Ok(());
                }
                drop(conn);

                match cmd {
                    Command::Help => commands::handle_help(&bot, &msg).await?,
                    Command::Admin => admin::handle_admin_command(&bot, &msg, &deps, actor_id).await?,
                }
                Ok(())
            }
        },
    ))
}

/// Handler for free-text messages, routed by conversation state.
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| !text.starts_with('/')).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let actor_id = actor_id_of(&msg);
                let _guard = deps.gate.acquire(actor_id).await;

                let conn = get_connection(&deps.db_pool)?;
                if policy::is_blocked(&conn, actor_id)? {
                    return Ok(());
                }
                drop(conn);

                match deps.states.get(actor_id) {
                    Some(ConversationState::CreatingOrg) => {
                        orgs::handle_new_org_name(&bot, &msg, &deps, actor_id).await
                    }
                    Some(ConversationState::RenamingOrg { org_id }) => {
                        orgs::handle_rename_input(&bot, &msg, &deps, actor_id, org_id).await
                    }
                    Some(ConversationState::AddingParticipant { org_id }) => {
                        participants::handle_fio_input(&bot, &msg, &deps, actor_id, org_id).await
                    }
                    Some(ConversationState::EditingFio { participant_id }) => {
                        participants::handle_edit_fio_input(&bot, &msg, &deps, actor_id, participant_id).await
                    }
                    Some(ConversationState::CollectingCards { target, cards }) => {
                        participants::handle_card_input(&bot, &msg, &deps, actor_id, target, cards).await
                    }
                    Some(ConversationState::JoiningOrg) => {
                        let code = msg.text().unwrap_or_default().to_string();
                        join::handle_join_code(&bot, &msg, &deps, actor_id, &code, false).await
                    }
                    Some(ConversationState::BlockingUser) => {
                        admin::handle_block_input(&bot, &msg, &deps, actor_id).await
                    }
                    None => {
                        // Idle: nothing expects free text; point at the menu.
                        orgs::send_main_menu(&bot, msg.chat.id).await
                    }
                }
            }
        })
}

/// Handler for callback queries (inline keyboard buttons).
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let Some(actor_id) = i64::try_from(q.from.id.0).ok() else {
                return Ok(());
            };
            let _guard = deps.gate.acquire(actor_id).await;

            let conn = get_connection(&deps.db_pool)?;
            if policy::is_blocked(&conn, actor_id)? {
                // Blocked actors get silence, not an explanation.
                return Ok(());
            }
            drop(conn);

            let Some(data) = q.data.clone() else {
                return Ok(());
            };
            let chat_id = q.message.as_ref().map(|m| m.chat().id);
            let message_id = q.message.as_ref().map(|m| m.id());
            let (Some(chat_id), Some(message_id)) = (chat_id, message_id) else {
                // Message too old for Telegram to reference; just ack.
                let _ = bot.answer_callback_query(q.id.clone()).await;
                return Ok(());
            };

            let ctx = CallbackCtx {
                id: q.id.clone(),
                chat_id,
                message_id,
                actor_id,
            };

            route_callback(&bot, &ctx, &deps, &data).await
        }
    })
}

/// Routes a callback data token to its flow.
async fn route_callback(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps, data: &str) -> Result<(), HandlerError> {
    let parts: Vec<&str> = data.split(':').collect();

    match parts.as_slice() {
        ["noop"] => {
            let _ = bot.answer_callback_query(ctx.id.clone()).await;
            Ok(())
        }
        ["main_menu"] => orgs::cb_main_menu(bot, ctx, deps).await,
        ["new_org"] => orgs::cb_new_org(bot, ctx, deps).await,
        ["my_orgs"] => orgs::cb_my_orgs(bot, ctx, deps).await,
        ["join_org"] => join::cb_join_prompt(bot, ctx, deps).await,
        ["org_view", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_org_view(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["org_link", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_org_link(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["rename_org", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_rename_org(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["delete_org", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_delete_org(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["leave_org", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_leave_org(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["list_members", id] => match parse_id(id) {
            Some(org_id) => orgs::cb_list_members(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["remove_member", tid, oid] => match (parse_id(tid), parse_id(oid)) {
            (Some(member_id), Some(org_id)) => orgs::cb_remove_member(bot, ctx, deps, member_id, org_id).await,
            _ => ack_bad_token(bot, ctx, data).await,
        },
        ["list_participants", id] => match parse_id(id) {
            Some(org_id) => participants::cb_list_participants(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["add_participant", id] => match parse_id(id) {
            Some(org_id) => participants::cb_add_participant(bot, ctx, deps, org_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["participant", id] => match parse_id(id) {
            Some(participant_id) => participants::cb_participant_view(bot, ctx, deps, participant_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["edit_fio", id] => match parse_id(id) {
            Some(participant_id) => participants::cb_edit_fio(bot, ctx, deps, participant_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["add_card", id] => match parse_id(id) {
            Some(participant_id) => participants::cb_add_card(bot, ctx, deps, participant_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["del_card", id] => match parse_id(id) {
            Some(participant_id) => participants::cb_del_card(bot, ctx, deps, participant_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["remove_card", cid, pid] => match (parse_id(cid), parse_id(pid)) {
            (Some(card_id), Some(participant_id)) => {
                participants::cb_remove_card(bot, ctx, deps, card_id, participant_id).await
            }
            _ => ack_bad_token(bot, ctx, data).await,
        },
        ["del_participant", id] => match parse_id(id) {
            Some(participant_id) => participants::cb_del_participant(bot, ctx, deps, participant_id).await,
            None => ack_bad_token(bot, ctx, data).await,
        },
        ["done"] => participants::cb_done(bot, ctx, deps).await,
        ["approve", tid, oid] => match (parse_id(tid), parse_id(oid)) {
            (Some(requester_id), Some(org_id)) => {
                join::cb_join_decision(bot, ctx, deps, true, requester_id, org_id).await
            }
            _ => ack_bad_token(bot, ctx, data).await,
        },
        ["deny", tid, oid] => match (parse_id(tid), parse_id(oid)) {
            (Some(requester_id), Some(org_id)) => {
                join::cb_join_decision(bot, ctx, deps, false, requester_id, org_id).await
            }
            _ => ack_bad_token(bot, ctx, data).await,
        },
        [first, ..] if first.starts_with("sa_") => admin::handle_admin_callback(bot, ctx, deps, &parts).await,
        _ => ack_bad_token(bot, ctx, data).await,
    }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

async fn ack_bad_token(bot: &Bot, ctx: &CallbackCtx, data: &str) -> Result<(), HandlerError> {
    log::warn!("Unrecognized callback data from {}: {}", ctx.actor_id, data);
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    Ok(())
}

/// Handler for inline search queries.
fn inline_query_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_inline_query().endpoint(move |bot: Bot, q: teloxide::types::InlineQuery| {
        let deps = deps.clone();
        async move {
            let Some(actor_id) = i64::try_from(q.from.id.0).ok() else {
                return Ok(());
            };
            let _guard = deps.gate.acquire(actor_id).await;
            inline::handle_inline_query(&bot, &q, &deps, actor_id).await
        }
    })
}
