//! Participant and card flows: add participant (FIO, then cards),
//! edit FIO, add/delete cards, delete participant.

use itertools::Itertools;
use teloxide::prelude::*;
use teloxide::types::Message;

use jamoacore::cards::{format_card, normalize_card_number};
use jamoacore::error::AppError;
use jamoacore::policy;
use jamoacore::storage::db;
use jamoacore::storage::{get_connection, DbConnection};
use jamoacore::CardCipher;

use super::orgs::{deny, not_found};
use super::{CallbackCtx, HandlerDeps, HandlerError};
use crate::telegram::menu;
use crate::telegram::state::{CardTarget, ConversationState};

/// Outcome of one card input while collecting.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CardEntry {
    /// Accepted; normalized digits to append to the batch.
    Added(String),
    /// Not 16 digits; re-prompt, no transition.
    Invalid,
    /// Already in the batch or already persisted for the participant.
    Duplicate,
}

/// Validates one card input against the batch collected so far and,
/// for an existing participant, against persisted cards.
pub(crate) fn evaluate_card_input(
    conn: &DbConnection,
    cipher: &CardCipher,
    target: &CardTarget,
    collected: &[String],
    input: &str,
) -> Result<CardEntry, AppError> {
    let Some(digits) = normalize_card_number(input) else {
        return Ok(CardEntry::Invalid);
    };
    if collected.iter().any(|card| card == &digits) {
        return Ok(CardEntry::Duplicate);
    }
    if let CardTarget::Existing { participant_id } = target {
        if db::card_exists(conn, cipher, *participant_id, &digits)? {
            return Ok(CardEntry::Duplicate);
        }
    }
    Ok(CardEntry::Added(digits))
}

/// Completes a card-collection flow: creates the participant first when
/// the target is new, then persists the cards in the order collected.
/// Returns the participant id and FIO for the summary message.
pub(crate) fn finalize_cards(
    conn: &DbConnection,
    cipher: &CardCipher,
    target: &CardTarget,
    cards: &[String],
) -> Result<(i64, String), AppError> {
    let (participant_id, fio) = match target {
        CardTarget::NewParticipant { org_id, fio } => {
            let id = db::create_participant(conn, *org_id, fio)?;
            (id, fio.clone())
        }
        CardTarget::Existing { participant_id } => {
            let participant =
                db::get_participant(conn, *participant_id)?.ok_or(AppError::NotFound("participant"))?;
            (participant.id, participant.fio)
        }
    };
    for digits in cards {
        db::add_card(conn, cipher, participant_id, digits)?;
    }
    Ok((participant_id, fio))
}

fn card_prompt() -> &'static str {
    "Send a card number (16 digits).\nYou can add several, one per message.\nPress Done when finished."
}

// --- Text-input flows ---

/// AddingParticipant: the message text is the new participant's FIO.
pub(super) async fn handle_fio_input(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    org_id: i64,
) -> Result<(), HandlerError> {
    let fio = msg.text().unwrap_or_default().trim().to_string();
    if fio.is_empty() {
        bot.send_message(msg.chat.id, "The FIO cannot be empty. Send the participant's FIO:")
            .await?;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    if !policy::can_manage(&conn, deps.config.super_admin_id, actor_id, org_id)? {
        bot.send_message(msg.chat.id, "⛔ Only the team owner can add participants.")
            .await?;
        return Ok(());
    }
    drop(conn);

    deps.states.set(
        actor_id,
        ConversationState::CollectingCards {
            target: CardTarget::NewParticipant { org_id, fio },
            cards: vec![],
        },
    );
    bot.send_message(msg.chat.id, card_prompt())
        .reply_markup(menu::done_button())
        .await?;
    Ok(())
}

/// EditingFio: the message text replaces the participant's FIO.
pub(super) async fn handle_edit_fio_input(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let fio = msg.text().unwrap_or_default().trim().to_string();
    if fio.is_empty() {
        bot.send_message(msg.chat.id, "The FIO cannot be empty. Send the new FIO:")
            .await?;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        drop(conn);
        deps.states.clear(actor_id);
        bot.send_message(msg.chat.id, "Participant not found.").await?;
        return Ok(());
    };
    if !policy::can_manage(&conn, deps.config.super_admin_id, actor_id, participant.org_id)? {
        bot.send_message(msg.chat.id, "⛔ Only the team owner can edit participants.")
            .await?;
        return Ok(());
    }
    db::rename_participant(&conn, participant_id, &fio)?;
    drop(conn);

    deps.states.clear(actor_id);
    bot.send_message(msg.chat.id, format!("✅ FIO updated: {}", fio))
        .reply_markup(menu::participant_detail(participant_id, participant.org_id, true))
        .await?;
    Ok(())
}

/// CollectingCards: each message is one card number. Invalid and
/// duplicate inputs re-prompt without leaving the state.
pub(super) async fn handle_card_input(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
    actor_id: i64,
    target: CardTarget,
    mut cards: Vec<String>,
) -> Result<(), HandlerError> {
    let input = msg.text().unwrap_or_default();

    let conn = get_connection(&deps.db_pool)?;
    let entry = evaluate_card_input(&conn, &deps.cipher, &target, &cards, input)?;
    drop(conn);

    match entry {
        CardEntry::Invalid => {
            bot.send_message(msg.chat.id, "Error! The card number must be exactly 16 digits. Try again:")
                .await?;
        }
        CardEntry::Duplicate => {
            bot.send_message(msg.chat.id, "⚠️ This card is already recorded. Send another one or press Done.")
                .reply_markup(menu::done_button())
                .await?;
        }
        CardEntry::Added(digits) => {
            let formatted = format_card(&digits);
            cards.push(digits);
            let count = cards.len();
            deps.states
                .set(actor_id, ConversationState::CollectingCards { target, cards });
            bot.send_message(
                msg.chat.id,
                format!("Card added: {}\nCards so far: {}. Send another one or press Done.", formatted, count),
            )
            .reply_markup(menu::done_button())
            .await?;
        }
    }
    Ok(())
}

// --- Callback flows ---

/// Shared gate: does the actor see this org, and may they manage it?
fn org_access(conn: &DbConnection, deps: &HandlerDeps, actor_id: i64, org_id: i64) -> Result<(bool, bool), AppError> {
    let manageable = policy::can_manage(conn, deps.config.super_admin_id, actor_id, org_id)?;
    let member = policy::is_member(conn, actor_id, org_id)?;
    Ok((manageable, member))
}

pub(super) async fn cb_list_participants(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    org_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    if db::get_org(&conn, org_id)?.is_none() {
        return not_found(bot, ctx, deps, "Team").await;
    }
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, org_id)?;
    if !manageable && !member {
        drop(conn);
        return deny(bot, ctx, false).await;
    }
    let participants = db::get_participants(&conn, org_id)?;
    drop(conn);

    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    if participants.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "No participants yet.")
            .reply_markup(menu::back_to_org(org_id))
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Participants:")
            .reply_markup(menu::participant_list(&participants, org_id))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_add_participant(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    org_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    if db::get_org(&conn, org_id)?.is_none() {
        return not_found(bot, ctx, deps, "Team").await;
    }
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, org_id)?;
    drop(conn);

    if !manageable {
        return deny(bot, ctx, member).await;
    }

    deps.states.set(ctx.actor_id, ConversationState::AddingParticipant { org_id });
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, "Send the participant's FIO:")
        .await?;
    Ok(())
}

pub(super) async fn cb_participant_view(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    if !manageable && !member {
        drop(conn);
        return deny(bot, ctx, false).await;
    }
    let cards = db::get_cards(&conn, &deps.cipher, participant_id)?;
    drop(conn);

    let cards_text = if cards.is_empty() {
        "(no cards)".to_string()
    } else {
        cards.iter().map(|card| format_card(&card.card_number)).join("\n")
    };

    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("👤 {}\n\n{}", participant.fio, cards_text))
        .reply_markup(menu::participant_detail(participant_id, participant.org_id, manageable))
        .await?;
    Ok(())
}

pub(super) async fn cb_edit_fio(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    drop(conn);

    if !manageable {
        return deny(bot, ctx, member).await;
    }

    deps.states.set(ctx.actor_id, ConversationState::EditingFio { participant_id });
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("Send the new FIO for {}:", participant.fio))
        .await?;
    Ok(())
}

pub(super) async fn cb_add_card(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    drop(conn);

    if !manageable {
        return deny(bot, ctx, member).await;
    }

    deps.states.set(
        ctx.actor_id,
        ConversationState::CollectingCards {
            target: CardTarget::Existing { participant_id },
            cards: vec![],
        },
    );
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(ctx.chat_id, ctx.message_id, card_prompt())
        .reply_markup(menu::done_button())
        .await?;
    Ok(())
}

pub(super) async fn cb_del_card(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }
    let cards = db::get_cards(&conn, &deps.cipher, participant_id)?;
    drop(conn);

    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    if cards.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("👤 {}\n\n(no cards)", participant.fio))
            .reply_markup(menu::participant_detail(participant_id, participant.org_id, true))
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Tap a card to delete it:")
            .reply_markup(menu::card_list_for_delete(&cards, participant_id))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_remove_card(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    card_id: i64,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }

    match db::delete_card(&conn, card_id) {
        Ok(()) => {}
        Err(AppError::NotFound(_)) => {
            drop(conn);
            return not_found(bot, ctx, deps, "Card").await;
        }
        Err(e) => return Err(e.into()),
    }

    // Destructive action: show the refreshed card list right away.
    let cards = db::get_cards(&conn, &deps.cipher, participant_id)?;
    drop(conn);

    let _ = bot.answer_callback_query(ctx.id.clone()).text("Card deleted").await;
    if cards.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, format!("👤 {}\n\n(no cards)", participant.fio))
            .reply_markup(menu::participant_detail(participant_id, participant.org_id, true))
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Tap a card to delete it:")
            .reply_markup(menu::card_list_for_delete(&cards, participant_id))
            .await?;
    }
    Ok(())
}

pub(super) async fn cb_del_participant(
    bot: &Bot,
    ctx: &CallbackCtx,
    deps: &HandlerDeps,
    participant_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let Some(participant) = db::get_participant(&conn, participant_id)? else {
        return not_found(bot, ctx, deps, "Participant").await;
    };
    let (manageable, member) = org_access(&conn, deps, ctx.actor_id, participant.org_id)?;
    if !manageable {
        drop(conn);
        return deny(bot, ctx, member).await;
    }

    db::delete_participant(&conn, participant_id)?;
    let participants = db::get_participants(&conn, participant.org_id)?;
    drop(conn);

    log::info!("actor {} deleted participant {} from org {}", ctx.actor_id, participant_id, participant.org_id);
    let _ = bot.answer_callback_query(ctx.id.clone()).text("Participant removed").await;
    if participants.is_empty() {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "No participants yet.")
            .reply_markup(menu::back_to_org(participant.org_id))
            .await?;
    } else {
        bot.edit_message_text(ctx.chat_id, ctx.message_id, "Participants:")
            .reply_markup(menu::participant_list(&participants, participant.org_id))
            .await?;
    }
    Ok(())
}

/// "Done" pressed during card collection. Needs at least one card;
/// otherwise the press is rejected and the state preserved.
pub(super) async fn cb_done(bot: &Bot, ctx: &CallbackCtx, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let Some(ConversationState::CollectingCards { target, cards }) = deps.states.get(ctx.actor_id) else {
        let _ = bot.answer_callback_query(ctx.id.clone()).text("Nothing to finish").await;
        return Ok(());
    };

    if cards.is_empty() {
        let _ = bot
            .answer_callback_query(ctx.id.clone())
            .text("Add at least one card first!")
            .await;
        return Ok(());
    }

    let conn = get_connection(&deps.db_pool)?;
    let (participant_id, fio) = match finalize_cards(&conn, &deps.cipher, &target, &cards) {
        Ok(result) => result,
        Err(AppError::NotFound(what)) => {
            drop(conn);
            return not_found(bot, ctx, deps, what).await;
        }
        Err(e) => return Err(e.into()),
    };
    drop(conn);

    deps.states.clear(ctx.actor_id);
    log::info!(
        "actor {} saved {} card(s) for participant {}",
        ctx.actor_id,
        cards.len(),
        participant_id
    );

    let cards_text = cards.iter().map(|digits| format_card(digits)).join("\n");
    let _ = bot.answer_callback_query(ctx.id.clone()).await;
    bot.edit_message_text(
        ctx.chat_id,
        ctx.message_id,
        format!("✅ Saved!\n\nFIO: {}\n\nCards:\n{}", fio, cards_text),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamoacore::storage::db::DbPool;
    use jamoacore::storage::{create_pool, get_connection};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_pool() -> (TempDir, DbPool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn test_cipher() -> CardCipher {
        CardCipher::new(&CardCipher::generate_key()).unwrap()
    }

    #[test]
    fn card_input_validates_and_normalizes() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();
        let target = CardTarget::NewParticipant {
            org_id: 1,
            fio: "John Doe".to_string(),
        };

        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &[], "1234 5678 1234 5678").unwrap(),
            CardEntry::Added("1234567812345678".to_string())
        );
        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &[], "12345").unwrap(),
            CardEntry::Invalid
        );
        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &[], "not a card").unwrap(),
            CardEntry::Invalid
        );
    }

    #[test]
    fn duplicate_in_batch_is_rejected() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();
        let target = CardTarget::NewParticipant {
            org_id: 1,
            fio: "John Doe".to_string(),
        };
        let collected = vec!["1234567812345678".to_string()];

        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &collected, "1234567812345678").unwrap(),
            CardEntry::Duplicate
        );
        // Whitespace differences don't evade the check.
        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &collected, "1234 5678 1234 5678").unwrap(),
            CardEntry::Duplicate
        );
    }

    #[test]
    fn duplicate_against_persisted_cards_is_rejected() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
        db::add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        let target = CardTarget::Existing { participant_id: pid };
        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &[], "1234567812345678").unwrap(),
            CardEntry::Duplicate
        );
        assert_eq!(
            evaluate_card_input(&conn, &cipher, &target, &[], "8765432187654321").unwrap(),
            CardEntry::Added("8765432187654321".to_string())
        );
    }

    #[test]
    fn finalize_creates_participant_then_cards_in_order() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        let target = CardTarget::NewParticipant {
            org_id: org.id,
            fio: "John Doe".to_string(),
        };
        let cards = vec!["1234567812345678".to_string(), "8765432187654321".to_string()];

        let (pid, fio) = finalize_cards(&conn, &cipher, &target, &cards).unwrap();
        assert_eq!(fio, "John Doe");

        let participants = db::get_participants(&conn, org.id).unwrap();
        assert_eq!(participants.len(), 1);

        let stored: Vec<String> = db::get_cards(&conn, &cipher, pid)
            .unwrap()
            .into_iter()
            .map(|c| c.card_number)
            .collect();
        assert_eq!(stored, cards);
    }

    #[test]
    fn finalize_for_deleted_participant_is_not_found() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
        db::delete_participant(&conn, pid).unwrap();

        let target = CardTarget::Existing { participant_id: pid };
        let cards = vec!["1234567812345678".to_string()];
        assert!(matches!(
            finalize_cards(&conn, &cipher, &target, &cards),
            Err(AppError::NotFound(_))
        ));
    }
}
