//! Daily content review

pub mod engine;
pub mod scheduler;
pub mod status;

pub use engine::{day_window, DailyReviewEngine, ReviewSummary};
pub use scheduler::{DailyReviewScheduler, TickOutcome};
pub use status::{next_status, BotStatusMachine, Transition, FLAGGED_THRESHOLD, UNDER_REVIEW_THRESHOLD};
