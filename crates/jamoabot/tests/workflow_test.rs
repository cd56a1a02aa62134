//! End-to-end workflow tests over the store, policy and conversation
//! state, without a Telegram transport: each test walks the same
//! sequence of store/policy calls the handlers make.

use jamoa::telegram::state::{CardTarget, ConversationState, StateStore};
use jamoacore::cards::{format_card, normalize_card_number};
use jamoacore::policy;
use jamoacore::storage::db;
use jamoacore::storage::{create_pool, get_connection, DbPool};
use jamoacore::CardCipher;
use tempfile::TempDir;

const SUPER_ADMIN: i64 = 900;
const OWNER: i64 = 1;
const JOINER: i64 = 2;

fn test_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.sqlite");
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    (dir, pool)
}

fn test_cipher() -> CardCipher {
    CardCipher::new(&CardCipher::generate_key()).unwrap()
}

/// A second actor joins via the unique_id, the owner approves, and the
/// requester becomes a member exactly once.
#[test]
fn join_approval_round_trip() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();

    // Owner creates "Team X" and is a member from the start.
    let org = db::create_org(&conn, "Team X", OWNER).unwrap();
    db::add_member(&conn, OWNER, org.id, Some("Owner"), None).unwrap();
    assert_eq!(org.unique_id.len(), 16);

    // The joiner arrives with the link payload: lookup succeeds, they
    // are neither a member nor privileged, so the owner must approve.
    let found = db::get_org_by_unique_id(&conn, &org.unique_id).unwrap().unwrap();
    assert!(!db::is_member(&conn, JOINER, found.id).unwrap());
    assert!(!policy::can_manage(&conn, SUPER_ADMIN, JOINER, found.id).unwrap());

    // Owner clicks approve: rights re-verified at click time, then the
    // membership is written with freshly resolved display fields.
    assert!(policy::can_manage(&conn, SUPER_ADMIN, OWNER, found.id).unwrap());
    db::add_member(&conn, JOINER, found.id, Some("Joiner"), Some("joiner")).unwrap();
    assert!(db::is_member(&conn, JOINER, found.id).unwrap());

    // Re-joining later is idempotent: still one row, fields refreshed.
    db::add_member(&conn, JOINER, found.id, Some("Joiner Renamed"), Some("joiner")).unwrap();
    let members = db::get_org_members(&conn, found.id).unwrap();
    assert_eq!(members.len(), 2);
}

/// Add-participant flow: FIO, a card, the same card again (rejected),
/// then done: exactly one participant with exactly one card persists.
#[test]
fn add_participant_with_duplicate_card_attempt() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();
    let cipher = test_cipher();
    let states = StateStore::new();

    let org = db::create_org(&conn, "Team", OWNER).unwrap();

    // FIO collected; now collecting cards.
    states.set(
        OWNER,
        ConversationState::CollectingCards {
            target: CardTarget::NewParticipant {
                org_id: org.id,
                fio: "John Doe".to_string(),
            },
            cards: vec![],
        },
    );

    // First card accepted into the batch.
    let first = normalize_card_number("1234567812345678").unwrap();
    let Some(ConversationState::CollectingCards { target, mut cards }) = states.get(OWNER) else {
        panic!("state lost");
    };
    cards.push(first.clone());
    states.set(OWNER, ConversationState::CollectingCards { target, cards });

    // The same digits again: rejected by the batch check, list unchanged.
    let Some(ConversationState::CollectingCards { target, cards }) = states.get(OWNER) else {
        panic!("state lost");
    };
    let again = normalize_card_number("1234 5678 1234 5678").unwrap();
    assert!(cards.contains(&again));
    assert_eq!(cards.len(), 1);

    // Done: participant first, then the cards in order.
    let CardTarget::NewParticipant { org_id, fio } = &target else {
        panic!("wrong target");
    };
    let pid = db::create_participant(&conn, *org_id, fio).unwrap();
    for digits in &cards {
        db::add_card(&conn, &cipher, pid, digits).unwrap();
    }
    states.clear(OWNER);

    let participants = db::get_participants(&conn, org.id).unwrap();
    assert_eq!(participants.len(), 1);
    let stored = db::get_cards(&conn, &cipher, pid).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].card_number, first);
    assert_eq!(states.get(OWNER), None);

    // Later session: the persisted-card check catches the duplicate too.
    assert!(db::card_exists(&conn, &cipher, pid, &first).unwrap());
}

/// A non-owner member cannot rename the org; the name is unchanged.
#[test]
fn member_cannot_rename_org() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();

    let org = db::create_org(&conn, "Original", OWNER).unwrap();
    db::add_member(&conn, JOINER, org.id, None, None).unwrap();

    // The handler gates the rename on can_manage and never reaches the
    // store for a plain member.
    assert!(!policy::can_manage(&conn, SUPER_ADMIN, JOINER, org.id).unwrap());
    assert_eq!(db::get_org(&conn, org.id).unwrap().unwrap().name, "Original");
}

/// The owner cannot be removed from their own member list.
#[test]
fn owner_cannot_be_removed_from_members() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();

    let org = db::create_org(&conn, "Team", OWNER).unwrap();
    db::add_member(&conn, OWNER, org.id, Some("Owner"), None).unwrap();

    assert!(db::remove_member(&conn, OWNER, org.id).is_err());
    assert!(db::is_member(&conn, OWNER, org.id).unwrap());
}

/// Blocking hides everything: a blocked actor's inline visibility set
/// is empty no matter what they were part of.
#[test]
fn blocked_actor_loses_search_visibility() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();
    let cipher = test_cipher();

    let org = db::create_org(&conn, "Team", 42).unwrap();
    db::add_member(&conn, 42, org.id, None, None).unwrap();
    let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
    db::add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

    db::block_user(&conn, 42).unwrap();

    // The inline handler returns an empty answer before ever touching
    // the participant tables.
    assert!(policy::is_blocked(&conn, 42).unwrap());

    // And after unblocking, visibility returns.
    db::unblock_user(&conn, 42).unwrap();
    assert!(!policy::is_blocked(&conn, 42).unwrap());
    let visible = db::get_participants_for_user(&conn, 42).unwrap();
    assert_eq!(visible.len(), 1);
}

/// Deep-link display format: the stored digits render grouped by four.
#[test]
fn card_display_round_trip() {
    let (_dir, pool) = test_pool();
    let conn = get_connection(&pool).unwrap();
    let cipher = test_cipher();

    let org = db::create_org(&conn, "Team", OWNER).unwrap();
    let pid = db::create_participant(&conn, org.id, "John Doe").unwrap();
    db::add_card(&conn, &cipher, pid, "8600120312345678").unwrap();

    let cards = db::get_cards(&conn, &cipher, pid).unwrap();
    assert_eq!(format_card(&cards[0].card_number), "8600 1203 1234 5678");
}
