//! Authorization policy: who may do what.
//!
//! Pure functions over the current store state plus the configured
//! super-admin identity. Handlers call these at the moment of the
//! action. Ownership is re-checked at click time, never trusted from
//! an earlier message.

use crate::error::AppError;
use crate::storage::db;
use crate::storage::DbConnection;

/// The single configured super-admin. An id of 0 matches nobody.
pub fn is_super_admin(super_admin_id: i64, actor_id: i64) -> bool {
    super_admin_id != 0 && actor_id == super_admin_id
}

pub fn is_owner(conn: &DbConnection, actor_id: i64, org_id: i64) -> Result<bool, AppError> {
    Ok(db::get_org(conn, org_id)?.is_some_and(|org| org.owner_id == actor_id))
}

pub fn is_member(conn: &DbConnection, actor_id: i64, org_id: i64) -> Result<bool, AppError> {
    db::is_member(conn, actor_id, org_id)
}

pub fn is_blocked(conn: &DbConnection, actor_id: i64) -> Result<bool, AppError> {
    db::is_blocked(conn, actor_id)
}

/// Gate for privileged actions on an organization (rename/delete org,
/// manage participants and cards, manage members, approve/deny joins):
/// owner or super-admin.
pub fn can_manage(conn: &DbConnection, super_admin_id: i64, actor_id: i64, org_id: i64) -> Result<bool, AppError> {
    if is_super_admin(super_admin_id, actor_id) {
        return Ok(true);
    }
    is_owner(conn, actor_id, org_id)
}

/// The super-admin can never be blocked, themselves included.
pub fn can_block(super_admin_id: i64, target_id: i64) -> bool {
    !is_super_admin(super_admin_id, target_id)
}
