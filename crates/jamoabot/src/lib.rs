//! jamoa — Telegram bot for managing teams, participants and their
//! payment cards.
//!
//! This crate holds everything Telegram-facing: the dispatcher schema,
//! conversation state, handlers, keyboards and background tasks. All
//! domain logic (storage, policy, card cipher) lives in `jamoacore`.
//!
//! # Module Structure
//!
//! - `cli`: clap command-line interface
//! - `health`: tiny /health HTTP endpoint for always-on deployments
//! - `keepalive`: periodic self-ping so free-tier hosts don't idle us out
//! - `telegram`: bot integration (schema, state machine, handlers)

pub mod cli;
pub mod health;
pub mod keepalive;
pub mod logging;
pub mod telegram;

pub use telegram::handlers::{schema, HandlerDeps};
