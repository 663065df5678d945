//! BotSentry Core - content review and bulk signup detection
//!
//! This crate provides the AI content classifier, the bot status state
//! machine, owner and admin notifications, the daily review engine and the
//! bulk signup detector with its remediation workflow.

pub mod bulk_signup;
pub mod classifier;
pub mod clock;
pub mod metrics;
pub mod notify;
pub mod review;
pub mod single_flight;

pub use bulk_signup::{
    ApprovalAuth, BulkSignupDetector, BulkSignupRemediation, BulkSignupScheduler,
    DetectionSummary, RemediationError,
};
pub use classifier::{AnthropicClassifier, ClassifierError, ClassifierInput, ContentClassifier, Verdict};
pub use clock::{Clock, FixedClock, SystemClock};
pub use metrics::SecurityMetrics;
pub use notify::{EmailContent, EmailError, EmailSender, OutboundEmail, OwnerNotifier, SmtpEmailSender, Templates};
pub use review::{BotStatusMachine, DailyReviewEngine, DailyReviewScheduler, ReviewSummary, TickOutcome};
