//! Inline keyboards for every menu the bot shows.
//!
//! Callback data stays terse (`verb:id` or `verb:id:id`); the router in
//! `handlers::schema` splits on `:`.

use jamoacore::storage::db::{BlockedUser, Card, Member, Organization, Participant};
use teloxide::types::InlineKeyboardMarkup;

use super::cb;
use jamoacore::cards::format_card;

/// Main menu shown on /start and on "back to menu".
pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![cb("➕ New team", "new_org"), cb("📋 My teams", "my_orgs")],
        vec![cb("🔑 Join a team", "join_org")],
    ])
}

pub fn my_orgs_list(orgs: &[Organization]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = orgs
        .iter()
        .map(|org| vec![cb(format!("📁 {}", org.name), format!("org_view:{}", org.id))])
        .collect();
    buttons.push(vec![cb("⬅️ Back", "main_menu")]);
    InlineKeyboardMarkup::new(buttons)
}

/// Team detail. Owners (and the super-admin) get the management rows;
/// plain members can only browse participants or leave.
pub fn org_detail(org_id: i64, manageable: bool) -> InlineKeyboardMarkup {
    if manageable {
        InlineKeyboardMarkup::new(vec![
            vec![
                cb("➕ Participant", format!("add_participant:{}", org_id)),
                cb("👥 Participants", format!("list_participants:{}", org_id)),
            ],
            vec![
                cb("👤 Members", format!("list_members:{}", org_id)),
                cb("🔗 Invite link", format!("org_link:{}", org_id)),
            ],
            vec![
                cb("✏️ Rename", format!("rename_org:{}", org_id)),
                cb("🗑 Delete", format!("delete_org:{}", org_id)),
            ],
            vec![cb("⬅️ Back", "my_orgs")],
        ])
    } else {
        InlineKeyboardMarkup::new(vec![
            vec![
                cb("👥 Participants", format!("list_participants:{}", org_id)),
                cb("🚪 Leave", format!("leave_org:{}", org_id)),
            ],
            vec![cb("⬅️ Back", "my_orgs")],
        ])
    }
}

/// Member list with remove buttons. The owner row is listed but not
/// removable; the owner is an implicit permanent member.
pub fn org_members_list(members: &[Member], org: &Organization) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = Vec::with_capacity(members.len() + 1);
    for member in members {
        let label = format!("👤 {}", member.display_name());
        if member.telegram_id == org.owner_id {
            buttons.push(vec![cb(format!("{} (owner)", label), "noop")]);
        } else {
            buttons.push(vec![
                cb(label, "noop"),
                cb("❌", format!("remove_member:{}:{}", member.telegram_id, org.id)),
            ]);
        }
    }
    buttons.push(vec![cb("⬅️ Back", format!("org_view:{}", org.id))]);
    InlineKeyboardMarkup::new(buttons)
}

pub fn participant_list(participants: &[Participant], org_id: i64) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = participants
        .iter()
        .map(|p| vec![cb(format!("👤 {}", p.fio), format!("participant:{}", p.id))])
        .collect();
    buttons.push(vec![cb("⬅️ Back", format!("org_view:{}", org_id))]);
    InlineKeyboardMarkup::new(buttons)
}

pub fn participant_detail(participant_id: i64, org_id: i64, manageable: bool) -> InlineKeyboardMarkup {
    if manageable {
        InlineKeyboardMarkup::new(vec![
            vec![
                cb("✏️ FIO", format!("edit_fio:{}", participant_id)),
                cb("💳 Add card", format!("add_card:{}", participant_id)),
            ],
            vec![
                cb("🗑 Card", format!("del_card:{}", participant_id)),
                cb("🗑 Remove", format!("del_participant:{}", participant_id)),
            ],
            vec![cb("⬅️ Back", format!("list_participants:{}", org_id))],
        ])
    } else {
        InlineKeyboardMarkup::new(vec![vec![cb("⬅️ Back", format!("list_participants:{}", org_id))]])
    }
}

/// Card list where tapping a card deletes it.
pub fn card_list_for_delete(cards: &[Card], participant_id: i64) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = cards
        .iter()
        .map(|card| {
            vec![cb(
                format!("💳 {}", format_card(&card.card_number)),
                format!("remove_card:{}:{}", card.id, participant_id),
            )]
        })
        .collect();
    buttons.push(vec![cb("⬅️ Back", format!("participant:{}", participant_id))]);
    InlineKeyboardMarkup::new(buttons)
}

/// Single back button into a team's detail view.
pub fn back_to_org(org_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![cb("⬅️ Back", format!("org_view:{}", org_id))]])
}

/// The only way out of a card-collection state.
pub fn done_button() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![cb("✅ Done", "done")]])
}

/// Approve/deny affordances attached to the join request sent to the
/// owner. The request itself lives only in this message.
pub fn join_request(telegram_id: i64, org_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        cb("✅ Approve", format!("approve:{}:{}", telegram_id, org_id)),
        cb("❌ Deny", format!("deny:{}:{}", telegram_id, org_id)),
    ]])
}

// --- Super admin ---

pub fn super_admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![cb("📋 Teams", "sa_all_orgs"), cb("🚫 Blocked", "sa_blocked_users")],
        vec![cb("🔒 Block a user", "sa_block_user")],
    ])
}

pub fn sa_org_list(orgs: &[Organization]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = orgs
        .iter()
        .map(|org| vec![cb(format!("📁 {}", org.name), format!("sa_org:{}", org.id))])
        .collect();
    buttons.push(vec![cb("⬅️ Back", "sa_back")]);
    InlineKeyboardMarkup::new(buttons)
}

pub fn sa_org_detail(org_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            cb("👥 Participants", format!("sa_participants:{}", org_id)),
            cb("👤 Members", format!("sa_members:{}", org_id)),
        ],
        vec![cb("🗑 Delete team", format!("sa_delete_org:{}", org_id))],
        vec![cb("⬅️ Back", "sa_all_orgs")],
    ])
}

/// Blocked users; tapping an entry unblocks it.
pub fn blocked_users_list(users: &[BlockedUser]) -> InlineKeyboardMarkup {
    let mut buttons: Vec<Vec<_>> = users
        .iter()
        .map(|user| vec![cb(format!("🚫 {}", user.telegram_id), format!("sa_unblock:{}", user.telegram_id))])
        .collect();
    buttons.push(vec![cb("⬅️ Back", "sa_back")]);
    InlineKeyboardMarkup::new(buttons)
}
