//! BotSentry Storage - Database access for the bot security subsystem
//!
//! This crate provides the PostgreSQL pool, the row models and one
//! repository trait per table group, each with a sqlx implementation.
//! With the `memory` feature it also provides in-memory implementations
//! of every repository for tests.

pub mod db;
#[cfg(feature = "memory")]
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
