//! Database, schema migration and CRUD for the five relations.

pub mod db;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
