//! Inline search: `@bot <query>` in any chat returns matching
//! participants with their card numbers.

use itertools::Itertools;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQuery, InlineQueryResult, InlineQueryResultArticle, InputMessageContent, InputMessageContentText,
};

use jamoacore::cards::format_card;
use jamoacore::error::AppError;
use jamoacore::policy;
use jamoacore::storage::db;
use jamoacore::storage::{get_connection, DbConnection};
use jamoacore::CardCipher;

use super::{HandlerDeps, HandlerError};

/// Telegram shows at most 50 inline results per answer.
const MAX_RESULTS: usize = 50;

/// One renderable search result.
#[derive(Debug)]
pub(crate) struct SearchHit {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub message_text: String,
}

/// Resolves an inline query to its result list.
///
/// Blocked actors and actors with no teams get an empty list, never an
/// error, so the response does not reveal why nothing matched. The
/// super-admin searches globally with org names in the titles; everyone
/// else searches across the teams they belong to. Participants without
/// cards are skipped.
pub(crate) fn search_participants(
    conn: &DbConnection,
    cipher: &CardCipher,
    super_admin_id: i64,
    actor_id: i64,
    query: &str,
) -> Result<Vec<SearchHit>, AppError> {
    if policy::is_blocked(conn, actor_id)? {
        return Ok(vec![]);
    }

    let privileged = policy::is_super_admin(super_admin_id, actor_id);
    let participants = if privileged {
        db::get_all_participants(conn)?
    } else {
        db::get_participants_for_user(conn, actor_id)?
    };

    let needle = query.trim().to_lowercase();
    let mut hits = Vec::new();

    for participant in participants {
        if !needle.is_empty() && !participant.fio.to_lowercase().contains(&needle) {
            continue;
        }

        let cards = db::get_cards(conn, cipher, participant.id)?;
        if cards.is_empty() {
            continue;
        }

        let cards_text = cards.iter().map(|card| format_card(&card.card_number)).join("\n");
        let title = if privileged {
            format!("{} ({})", participant.fio, participant.org_name)
        } else {
            participant.fio.clone()
        };

        hits.push(SearchHit {
            id: participant.id,
            title,
            description: format!("{} card(s)", cards.len()),
            message_text: format!("{}\n{}", participant.fio, cards_text),
        });

        if hits.len() >= MAX_RESULTS {
            break;
        }
    }

    Ok(hits)
}

pub(super) async fn handle_inline_query(
    bot: &Bot,
    q: &InlineQuery,
    deps: &HandlerDeps,
    actor_id: i64,
) -> Result<(), HandlerError> {
    let conn = get_connection(&deps.db_pool)?;
    let hits = search_participants(&conn, &deps.cipher, deps.config.super_admin_id, actor_id, &q.query)?;
    drop(conn);

    let results: Vec<InlineQueryResult> = hits
        .into_iter()
        .map(|hit| {
            InlineQueryResult::Article(
                InlineQueryResultArticle::new(
                    hit.id.to_string(),
                    hit.title,
                    InputMessageContent::Text(InputMessageContentText::new(hit.message_text)),
                )
                .description(hit.description),
            )
        })
        .collect();

    bot.answer_inline_query(q.id.clone(), results).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamoacore::storage::db::DbPool;
    use jamoacore::storage::create_pool;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SUPER_ADMIN: i64 = 900;

    fn test_pool() -> (TempDir, DbPool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn cipher() -> CardCipher {
        CardCipher::new(&CardCipher::generate_key()).unwrap()
    }

    #[test]
    fn blocked_actor_gets_empty_results_for_any_query() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = cipher();

        let org = db::create_org(&conn, "Team", 42).unwrap();
        db::add_member(&conn, 42, org.id, None, None).unwrap();
        let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
        db::add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        db::block_user(&conn, 42).unwrap();

        assert!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "").unwrap().is_empty());
        assert!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "John").unwrap().is_empty());
    }

    #[test]
    fn search_is_scoped_to_member_orgs() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = cipher();

        let mine = db::create_org(&conn, "Mine", 1).unwrap();
        let other = db::create_org(&conn, "Other", 2).unwrap();
        db::add_member(&conn, 42, mine.id, None, None).unwrap();
        let p1 = db::create_participant(&conn, mine.id, "Alice").unwrap();
        let p2 = db::create_participant(&conn, other.id, "Bob").unwrap();
        db::add_card(&conn, &cipher, p1, "1234567812345678").unwrap();
        db::add_card(&conn, &cipher, p2, "8765432187654321").unwrap();

        let hits = search_participants(&conn, &cipher, SUPER_ADMIN, 42, "").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Alice");

        // The super-admin sees everything, titles carry the org name.
        let all = search_participants(&conn, &cipher, SUPER_ADMIN, SUPER_ADMIN, "").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Alice (Mine)");
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        db::add_member(&conn, 42, org.id, None, None).unwrap();
        let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
        db::add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        assert_eq!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "john").unwrap().len(), 1);
        assert_eq!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "DOE").unwrap().len(), 1);
        assert_eq!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "hn d").unwrap().len(), 1);
        assert!(search_participants(&conn, &cipher, SUPER_ADMIN, 42, "nobody").unwrap().is_empty());
    }

    #[test]
    fn participants_without_cards_are_skipped_and_cards_are_formatted() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        db::add_member(&conn, 42, org.id, None, None).unwrap();
        db::create_participant(&conn, org.id, "No Cards").unwrap();
        let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
        db::add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        let hits = search_participants(&conn, &cipher, SUPER_ADMIN, 42, "").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message_text, "John Doe\n1234 5678 1234 5678");
        assert_eq!(hits[0].description, "1 card(s)");
    }

    #[test]
    fn results_are_capped_at_fifty() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = cipher();

        let org = db::create_org(&conn, "Team", 1).unwrap();
        db::add_member(&conn, 42, org.id, None, None).unwrap();
        for i in 0..60 {
            let pid = db::create_participant(&conn, org.id, &format!("Person {}", i)).unwrap();
            db::add_card(&conn, &cipher, pid, &format!("{:016}", i)).unwrap();
        }

        let hits = search_participants(&conn, &cipher, SUPER_ADMIN, 42, "").unwrap();
        assert_eq!(hits.len(), MAX_RESULTS);
    }
}
