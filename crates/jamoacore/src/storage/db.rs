use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::cards::CARD_DIGITS;
use crate::crypto::CardCipher;
use crate::error::AppError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// An organization (team). `unique_id` is the 16-char opaque token that
/// rides in invite links; it never changes and is never reused.
#[derive(Debug, Clone)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub unique_id: String,
    pub owner_id: i64,
}

/// A user↔organization membership row with display fields cached at
/// join/approval time.
#[derive(Debug, Clone)]
pub struct Member {
    pub telegram_id: i64,
    pub org_id: i64,
    pub full_name: Option<String>,
    pub username: Option<String>,
}

impl Member {
    /// Name to show in member lists: cached full name, else the raw id.
    pub fn display_name(&self) -> String {
        self.full_name
            .clone()
            .unwrap_or_else(|| self.telegram_id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: i64,
    pub org_id: i64,
    pub fio: String,
}

/// Participant joined with its owning organization's name, for
/// privileged global listings and inline search.
#[derive(Debug, Clone)]
pub struct ParticipantWithOrg {
    pub id: i64,
    pub org_id: i64,
    pub fio: String,
    pub org_name: String,
}

/// A card with its number already decrypted for display.
#[derive(Debug, Clone)]
pub struct Card {
    pub id: i64,
    pub participant_id: i64,
    pub card_number: String,
}

#[derive(Debug, Clone)]
pub struct BlockedUser {
    pub telegram_id: i64,
    pub blocked_at: String,
}

/// Create the connection pool and bring the schema up to date.
///
/// Foreign keys are switched on per connection, so org and participant
/// deletes cascade at the store level, not in handler code.
pub fn create_pool(database_path: &str) -> Result<DbPool, AppError> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    migrate_schema(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, AppError> {
    Ok(pool.get()?)
}

/// Creates the five relations if they do not exist yet.
fn migrate_schema(conn: &DbConnection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            unique_id TEXT UNIQUE NOT NULL,
            owner_id INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            org_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            fio TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            participant_id INTEGER NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
            card_number TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS user_orgs (
            telegram_id INTEGER NOT NULL,
            org_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            full_name TEXT,
            username TEXT,
            PRIMARY KEY (telegram_id, org_id)
        );
        CREATE TABLE IF NOT EXISTS blocked_users (
            telegram_id INTEGER PRIMARY KEY,
            blocked_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_participants_org_id ON participants(org_id);
        CREATE INDEX IF NOT EXISTS idx_cards_participant_id ON cards(participant_id);
        CREATE INDEX IF NOT EXISTS idx_user_orgs_org_id ON user_orgs(org_id);",
    )?;
    Ok(())
}

/// Generates a 16-char opaque token for invite links.
fn generate_unique_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    hex[..16].to_string()
}

// --- Organizations ---

/// Creates an organization with a freshly allocated unique_id and
/// returns it. The UNIQUE constraint arbitrates concurrent creation; on
/// the (cosmically unlikely) collision we retry with a new token.
pub fn create_org(conn: &DbConnection, name: &str, owner_id: i64) -> Result<Organization, AppError> {
    for _ in 0..5 {
        let unique_id = generate_unique_id();
        match conn.execute(
            "INSERT INTO organizations (name, unique_id, owner_id) VALUES (?1, ?2, ?3)",
            params![name, unique_id, owner_id],
        ) {
            Ok(_) => {
                return Ok(Organization {
                    id: conn.last_insert_rowid(),
                    name: name.to_string(),
                    unique_id,
                    owner_id,
                });
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                log::warn!("unique_id collision while creating org, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Validation("could not allocate a unique team id".to_string()))
}

pub fn get_org(conn: &DbConnection, org_id: i64) -> Result<Option<Organization>, AppError> {
    let mut stmt = conn.prepare("SELECT id, name, unique_id, owner_id FROM organizations WHERE id = ?1")?;
    let mut rows = stmt.query(params![org_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(Organization {
            id: row.get(0)?,
            name: row.get(1)?,
            unique_id: row.get(2)?,
            owner_id: row.get(3)?,
        })),
        None => Ok(None),
    }
}

pub fn get_org_by_unique_id(conn: &DbConnection, unique_id: &str) -> Result<Option<Organization>, AppError> {
    let mut stmt = conn.prepare("SELECT id, name, unique_id, owner_id FROM organizations WHERE unique_id = ?1")?;
    let mut rows = stmt.query(params![unique_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(Organization {
            id: row.get(0)?,
            name: row.get(1)?,
            unique_id: row.get(2)?,
            owner_id: row.get(3)?,
        })),
        None => Ok(None),
    }
}

/// All organizations, for the super-admin panel.
pub fn get_all_orgs(conn: &DbConnection) -> Result<Vec<Organization>, AppError> {
    let mut stmt = conn.prepare("SELECT id, name, unique_id, owner_id FROM organizations ORDER BY id")?;
    let orgs = stmt
        .query_map([], |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                unique_id: row.get(2)?,
                owner_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(orgs)
}

pub fn rename_org(conn: &DbConnection, org_id: i64, new_name: &str) -> Result<(), AppError> {
    let updated = conn.execute(
        "UPDATE organizations SET name = ?1 WHERE id = ?2",
        params![new_name, org_id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound("organization"));
    }
    Ok(())
}

/// Deletes an organization; participants, cards and memberships cascade.
pub fn delete_org(conn: &DbConnection, org_id: i64) -> Result<(), AppError> {
    let deleted = conn.execute("DELETE FROM organizations WHERE id = ?1", params![org_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("organization"));
    }
    Ok(())
}

// --- Memberships ---

/// Adds a membership, or refreshes the cached display fields if the row
/// already exists. The upsert is a single atomic statement, so re-joins
/// can never produce duplicate rows.
pub fn add_member(
    conn: &DbConnection,
    telegram_id: i64,
    org_id: i64,
    full_name: Option<&str>,
    username: Option<&str>,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO user_orgs (telegram_id, org_id, full_name, username)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (telegram_id, org_id) DO UPDATE
         SET full_name = ?3, username = ?4",
        params![telegram_id, org_id, full_name, username],
    )?;
    Ok(())
}

/// Removes a membership. The owner's row is protected here, not just in
/// the UI. The owner is an implicit permanent member of their team.
pub fn remove_member(conn: &DbConnection, telegram_id: i64, org_id: i64) -> Result<(), AppError> {
    if let Some(org) = get_org(conn, org_id)? {
        if org.owner_id == telegram_id {
            return Err(AppError::Validation("the owner cannot be removed from their own team".to_string()));
        }
    }
    conn.execute(
        "DELETE FROM user_orgs WHERE telegram_id = ?1 AND org_id = ?2",
        params![telegram_id, org_id],
    )?;
    Ok(())
}

/// Organizations the actor belongs to, owner orgs included.
pub fn get_member_orgs(conn: &DbConnection, telegram_id: i64) -> Result<Vec<Organization>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.name, o.unique_id, o.owner_id FROM organizations o
         JOIN user_orgs uo ON uo.org_id = o.id
         WHERE uo.telegram_id = ?1 ORDER BY o.id",
    )?;
    let orgs = stmt
        .query_map(params![telegram_id], |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                unique_id: row.get(2)?,
                owner_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(orgs)
}

pub fn get_org_members(conn: &DbConnection, org_id: i64) -> Result<Vec<Member>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT telegram_id, org_id, full_name, username FROM user_orgs
         WHERE org_id = ?1 ORDER BY telegram_id",
    )?;
    let members = stmt
        .query_map(params![org_id], |row| {
            Ok(Member {
                telegram_id: row.get(0)?,
                org_id: row.get(1)?,
                full_name: row.get(2)?,
                username: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

pub fn is_member(conn: &DbConnection, telegram_id: i64, org_id: i64) -> Result<bool, AppError> {
    let mut stmt = conn.prepare("SELECT 1 FROM user_orgs WHERE telegram_id = ?1 AND org_id = ?2")?;
    let mut rows = stmt.query(params![telegram_id, org_id])?;
    Ok(rows.next()?.is_some())
}

// --- Participants ---

pub fn create_participant(conn: &DbConnection, org_id: i64, fio: &str) -> Result<i64, AppError> {
    // Insert fails with a foreign-key violation when the org was
    // deleted underneath the conversation; surface that as NotFound.
    match conn.execute(
        "INSERT INTO participants (org_id, fio) VALUES (?1, ?2)",
        params![org_id, fio],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(AppError::NotFound("organization"))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_participant(conn: &DbConnection, participant_id: i64) -> Result<Option<Participant>, AppError> {
    let mut stmt = conn.prepare("SELECT id, org_id, fio FROM participants WHERE id = ?1")?;
    let mut rows = stmt.query(params![participant_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(Participant {
            id: row.get(0)?,
            org_id: row.get(1)?,
            fio: row.get(2)?,
        })),
        None => Ok(None),
    }
}

pub fn get_participants(conn: &DbConnection, org_id: i64) -> Result<Vec<Participant>, AppError> {
    let mut stmt = conn.prepare("SELECT id, org_id, fio FROM participants WHERE org_id = ?1 ORDER BY id")?;
    let participants = stmt
        .query_map(params![org_id], |row| {
            Ok(Participant {
                id: row.get(0)?,
                org_id: row.get(1)?,
                fio: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

/// Every participant with its org name, for privileged global search.
pub fn get_all_participants(conn: &DbConnection) -> Result<Vec<ParticipantWithOrg>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.org_id, p.fio, o.name FROM participants p
         JOIN organizations o ON o.id = p.org_id ORDER BY p.id",
    )?;
    let participants = stmt
        .query_map([], |row| {
            Ok(ParticipantWithOrg {
                id: row.get(0)?,
                org_id: row.get(1)?,
                fio: row.get(2)?,
                org_name: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

/// Participants across every organization the actor is a member of:
/// the visibility set for non-privileged inline search.
pub fn get_participants_for_user(conn: &DbConnection, telegram_id: i64) -> Result<Vec<ParticipantWithOrg>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.org_id, p.fio, o.name FROM participants p
         JOIN organizations o ON o.id = p.org_id
         JOIN user_orgs uo ON uo.org_id = o.id
         WHERE uo.telegram_id = ?1 ORDER BY p.id",
    )?;
    let participants = stmt
        .query_map(params![telegram_id], |row| {
            Ok(ParticipantWithOrg {
                id: row.get(0)?,
                org_id: row.get(1)?,
                fio: row.get(2)?,
                org_name: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

pub fn rename_participant(conn: &DbConnection, participant_id: i64, new_fio: &str) -> Result<(), AppError> {
    let updated = conn.execute(
        "UPDATE participants SET fio = ?1 WHERE id = ?2",
        params![new_fio, participant_id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound("participant"));
    }
    Ok(())
}

/// Deletes a participant; its cards cascade.
pub fn delete_participant(conn: &DbConnection, participant_id: i64) -> Result<(), AppError> {
    let deleted = conn.execute("DELETE FROM participants WHERE id = ?1", params![participant_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("participant"));
    }
    Ok(())
}

// --- Cards ---

/// Encrypts and stores a card number (16 digits, already normalized).
pub fn add_card(
    conn: &DbConnection,
    cipher: &CardCipher,
    participant_id: i64,
    card_number: &str,
) -> Result<i64, AppError> {
    debug_assert_eq!(card_number.len(), CARD_DIGITS);
    let stored = cipher.encrypt(card_number);
    match conn.execute(
        "INSERT INTO cards (participant_id, card_number) VALUES (?1, ?2)",
        params![participant_id, stored],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Err(AppError::NotFound("participant"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Cards of a participant with numbers decrypted for display; legacy
/// plaintext rows come back unchanged.
pub fn get_cards(conn: &DbConnection, cipher: &CardCipher, participant_id: i64) -> Result<Vec<Card>, AppError> {
    let mut stmt = conn.prepare("SELECT id, participant_id, card_number FROM cards WHERE participant_id = ?1 ORDER BY id")?;
    let cards = stmt
        .query_map(params![participant_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|(id, participant_id, stored)| Card {
            id,
            participant_id,
            card_number: cipher.reveal(&stored),
        })
        .collect();
    Ok(cards)
}

/// True when the participant already has a card with this digit string,
/// comparing decrypted values (legacy rows compare raw).
pub fn card_exists(
    conn: &DbConnection,
    cipher: &CardCipher,
    participant_id: i64,
    card_number: &str,
) -> Result<bool, AppError> {
    let mut stmt = conn.prepare("SELECT card_number FROM cards WHERE participant_id = ?1")?;
    let stored: Vec<String> = stmt
        .query_map(params![participant_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stored.iter().any(|s| cipher.reveal(s) == card_number))
}

pub fn delete_card(conn: &DbConnection, card_id: i64) -> Result<(), AppError> {
    let deleted = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("card"));
    }
    Ok(())
}

/// Re-encrypts legacy plaintext card rows in place. Returns the number
/// of rows rewritten (or that would be, under `dry_run`). Runs at
/// startup and behind the `migrate-cards` CLI subcommand.
pub fn encrypt_legacy_cards(conn: &DbConnection, cipher: &CardCipher, dry_run: bool) -> Result<usize, AppError> {
    let mut stmt = conn.prepare("SELECT id, card_number FROM cards")?;
    let rows: Vec<(i64, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rewritten = 0usize;
    for (id, stored) in rows {
        if CardCipher::is_encrypted(&stored) {
            continue;
        }
        if !dry_run {
            let encrypted = cipher.encrypt(&stored);
            conn.execute("UPDATE cards SET card_number = ?1 WHERE id = ?2", params![encrypted, id])?;
        }
        rewritten += 1;
    }
    Ok(rewritten)
}

// --- Blocklist ---

/// Blocks an actor. Blocking twice keeps the original blocked_at.
pub fn block_user(conn: &DbConnection, telegram_id: i64) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO blocked_users (telegram_id) VALUES (?1) ON CONFLICT DO NOTHING",
        params![telegram_id],
    )?;
    Ok(())
}

pub fn unblock_user(conn: &DbConnection, telegram_id: i64) -> Result<(), AppError> {
    conn.execute("DELETE FROM blocked_users WHERE telegram_id = ?1", params![telegram_id])?;
    Ok(())
}

pub fn get_blocked_users(conn: &DbConnection) -> Result<Vec<BlockedUser>, AppError> {
    let mut stmt = conn.prepare("SELECT telegram_id, blocked_at FROM blocked_users ORDER BY blocked_at DESC")?;
    let users = stmt
        .query_map([], |row| {
            Ok(BlockedUser {
                telegram_id: row.get(0)?,
                blocked_at: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn is_blocked(conn: &DbConnection, telegram_id: i64) -> Result<bool, AppError> {
    let mut stmt = conn.prepare("SELECT 1 FROM blocked_users WHERE telegram_id = ?1")?;
    let mut rows = stmt.query(params![telegram_id])?;
    Ok(rows.next()?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn unique_id_is_16_chars_and_unique() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let a = create_org(&conn, "Team A", 1).unwrap();
        let b = create_org(&conn, "Team B", 1).unwrap();
        assert_eq!(a.unique_id.len(), 16);
        assert_eq!(b.unique_id.len(), 16);
        assert_ne!(a.unique_id, b.unique_id);
        let found = get_org_by_unique_id(&conn, &a.unique_id).unwrap().unwrap();
        assert_eq!(found.id, a.id);
        assert_eq!(found.owner_id, 1);
    }

    #[test]
    fn rename_and_delete_report_not_found() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        assert!(matches!(rename_org(&conn, 999, "x"), Err(AppError::NotFound(_))));
        assert!(matches!(delete_org(&conn, 999), Err(AppError::NotFound(_))));
        assert!(matches!(rename_participant(&conn, 999, "x"), Err(AppError::NotFound(_))));
        assert!(matches!(delete_card(&conn, 999), Err(AppError::NotFound(_))));
    }

    #[test]
    fn delete_org_cascades_to_participants_cards_and_members() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = create_org(&conn, "Team", 1).unwrap();
        add_member(&conn, 1, org.id, Some("Owner"), None).unwrap();
        add_member(&conn, 2, org.id, Some("Member"), None).unwrap();
        let pid = create_participant(&conn, org.id, "John Doe").unwrap();
        add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        delete_org(&conn, org.id).unwrap();

        assert!(get_participant(&conn, pid).unwrap().is_none());
        assert!(get_cards(&conn, &cipher, pid).unwrap().is_empty());
        assert!(get_org_members(&conn, org.id).unwrap().is_empty());
        assert!(!is_member(&conn, 2, org.id).unwrap());
    }

    #[test]
    fn delete_participant_cascades_to_cards() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = create_org(&conn, "Team", 1).unwrap();
        let pid = create_participant(&conn, org.id, "John Doe").unwrap();
        add_card(&conn, &cipher, pid, "1234567812345678").unwrap();
        add_card(&conn, &cipher, pid, "8765432187654321").unwrap();

        delete_participant(&conn, pid).unwrap();
        assert!(get_cards(&conn, &cipher, pid).unwrap().is_empty());
    }

    #[test]
    fn membership_upsert_is_idempotent_and_refreshes_display_fields() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let org = create_org(&conn, "Team", 1).unwrap();
        add_member(&conn, 42, org.id, Some("Old Name"), Some("old")).unwrap();
        add_member(&conn, 42, org.id, Some("New Name"), Some("new")).unwrap();

        let members = get_org_members(&conn, org.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].full_name.as_deref(), Some("New Name"));
        assert_eq!(members[0].username.as_deref(), Some("new"));
    }

    #[test]
    fn owner_membership_cannot_be_removed() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let org = create_org(&conn, "Team", 1).unwrap();
        add_member(&conn, 1, org.id, Some("Owner"), None).unwrap();
        add_member(&conn, 2, org.id, Some("Member"), None).unwrap();

        assert!(matches!(remove_member(&conn, 1, org.id), Err(AppError::Validation(_))));
        assert!(is_member(&conn, 1, org.id).unwrap());

        remove_member(&conn, 2, org.id).unwrap();
        assert!(!is_member(&conn, 2, org.id).unwrap());
    }

    #[test]
    fn member_orgs_lists_joined_orgs_only() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let a = create_org(&conn, "A", 1).unwrap();
        let _b = create_org(&conn, "B", 1).unwrap();
        add_member(&conn, 42, a.id, None, None).unwrap();

        let orgs = get_member_orgs(&conn, 42).unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].name, "A");
    }

    #[test]
    fn cards_are_encrypted_at_rest_and_decrypted_on_read() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = create_org(&conn, "Team", 1).unwrap();
        let pid = create_participant(&conn, org.id, "John Doe").unwrap();
        add_card(&conn, &cipher, pid, "1234567812345678").unwrap();

        // Raw stored value must carry the version tag, not the digits.
        let raw: String = conn
            .query_row("SELECT card_number FROM cards WHERE participant_id = ?1", params![pid], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(CardCipher::is_encrypted(&raw));
        assert!(!raw.contains("1234567812345678"));

        let cards = get_cards(&conn, &cipher, pid).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].card_number, "1234567812345678");
    }

    #[test]
    fn card_exists_sees_encrypted_and_legacy_rows() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = create_org(&conn, "Team", 1).unwrap();
        let pid = create_participant(&conn, org.id, "John Doe").unwrap();
        add_card(&conn, &cipher, pid, "1234567812345678").unwrap();
        // Legacy plaintext row written before encryption existed.
        conn.execute(
            "INSERT INTO cards (participant_id, card_number) VALUES (?1, ?2)",
            params![pid, "8600120312345678"],
        )
        .unwrap();

        assert!(card_exists(&conn, &cipher, pid, "1234567812345678").unwrap());
        assert!(card_exists(&conn, &cipher, pid, "8600120312345678").unwrap());
        assert!(!card_exists(&conn, &cipher, pid, "0000000000000000").unwrap());
    }

    #[test]
    fn legacy_migration_rewrites_only_untagged_rows() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        let cipher = test_cipher();

        let org = create_org(&conn, "Team", 1).unwrap();
        let pid = create_participant(&conn, org.id, "John Doe").unwrap();
        add_card(&conn, &cipher, pid, "1234567812345678").unwrap();
        conn.execute(
            "INSERT INTO cards (participant_id, card_number) VALUES (?1, ?2)",
            params![pid, "8600120312345678"],
        )
        .unwrap();

        // Dry run counts but does not touch rows.
        assert_eq!(encrypt_legacy_cards(&conn, &cipher, true).unwrap(), 1);
        let still_raw: i64 = conn
            .query_row("SELECT COUNT(*) FROM cards WHERE card_number NOT LIKE 'v1:%'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(still_raw, 1);

        assert_eq!(encrypt_legacy_cards(&conn, &cipher, false).unwrap(), 1);
        let raw_left: i64 = conn
            .query_row("SELECT COUNT(*) FROM cards WHERE card_number NOT LIKE 'v1:%'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw_left, 0);

        // Re-running finds nothing to do; values still read back fine.
        assert_eq!(encrypt_legacy_cards(&conn, &cipher, false).unwrap(), 0);
        let numbers: Vec<String> = get_cards(&conn, &cipher, pid)
            .unwrap()
            .into_iter()
            .map(|c| c.card_number)
            .collect();
        assert_eq!(numbers, vec!["1234567812345678".to_string(), "8600120312345678".to_string()]);
    }

    #[test]
    fn blocklist_round_trip() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        assert!(!is_blocked(&conn, 42).unwrap());
        block_user(&conn, 42).unwrap();
        block_user(&conn, 42).unwrap(); // idempotent
        assert!(is_blocked(&conn, 42).unwrap());
        assert_eq!(get_blocked_users(&conn).unwrap().len(), 1);

        unblock_user(&conn, 42).unwrap();
        assert!(!is_blocked(&conn, 42).unwrap());
    }

    #[test]
    fn participants_for_user_follow_membership() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let a = create_org(&conn, "A", 1).unwrap();
        let b = create_org(&conn, "B", 2).unwrap();
        create_participant(&conn, a.id, "Alice").unwrap();
        create_participant(&conn, b.id, "Bob").unwrap();
        add_member(&conn, 42, a.id, None, None).unwrap();

        let visible = get_participants_for_user(&conn, 42).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].fio, "Alice");
        assert_eq!(visible[0].org_name, "A");

        let global = get_all_participants(&conn).unwrap();
        assert_eq!(global.len(), 2);
    }

    #[test]
    fn create_participant_for_deleted_org_is_not_found() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();

        let org = create_org(&conn, "Team", 1).unwrap();
        delete_org(&conn, org.id).unwrap();
        assert!(matches!(
            create_participant(&conn, org.id, "John Doe"),
            Err(AppError::NotFound(_))
        ));
    }
}
