//! Repository layer for data access

pub mod api_keys;
pub mod bots;
pub mod bulk_signups;
pub mod email_flags;
pub mod messages;
pub mod reports;
pub mod security_events;

use crate::db::DatabasePool;
use std::sync::Arc;

pub use api_keys::{AdminKeyRepository, DbAdminKeyRepository};
pub use bots::{BotRepository, DbBotRepository};
pub use bulk_signups::{BulkSignupRepository, DbBulkSignupRepository};
pub use email_flags::{DbEmailFlagRepository, EmailFlagRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use reports::{DbSecurityReportRepository, SecurityReportRepository};
pub use security_events::{DbSecurityEventRepository, SecurityEventRepository};

/// All repositories used by the security subsystem
#[derive(Clone)]
pub struct Repositories {
    pub bots: Arc<dyn BotRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub flags: Arc<dyn EmailFlagRepository>,
    pub reports: Arc<dyn SecurityReportRepository>,
    pub bulk_signups: Arc<dyn BulkSignupRepository>,
    pub events: Arc<dyn SecurityEventRepository>,
    pub api_keys: Arc<dyn AdminKeyRepository>,
}

impl Repositories {
    /// Build PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            bots: Arc::new(DbBotRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            flags: Arc::new(DbEmailFlagRepository::new(pool.clone())),
            reports: Arc::new(DbSecurityReportRepository::new(pool.clone())),
            bulk_signups: Arc::new(DbBulkSignupRepository::new(pool.clone())),
            events: Arc::new(DbSecurityEventRepository::new(pool.clone())),
            api_keys: Arc::new(DbAdminKeyRepository::new(pool)),
        }
    }
}
