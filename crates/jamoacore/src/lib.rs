//! jamoacore — core library for the jamoa team bot.
//!
//! Everything that does not talk to Telegram lives here:
//!
//! - `config`: process configuration, read once at startup
//! - `error`: the shared `AppError` type
//! - `crypto`: card-number encryption at rest
//! - `cards`: card-number validation and display formatting
//! - `policy`: who may do what (owner / member / super-admin / blocked)
//! - `storage`: SQLite pool, schema migration and CRUD for the five
//!   relations (organizations, participants, cards, memberships,
//!   blocklist)

pub mod cards;
pub mod config;
pub mod crypto;
pub mod error;
pub mod policy;
pub mod storage;

pub use config::Config;
pub use crypto::CardCipher;
pub use error::{AppError, AppResult};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
