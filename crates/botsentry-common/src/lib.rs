//! BotSentry Common - Shared types and utilities
//!
//! This crate provides configuration, the error type and the status enums
//! shared by the storage, core and API crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
