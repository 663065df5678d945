//! Bulk signup detection and remediation

pub mod detector;
pub mod remediation;
pub mod scheduler;

pub use detector::{
    candidate_prefixes, cluster_signature, common_sender_prefix, find_clusters,
    generate_approval_token, BulkSignupDetector, Cluster, DetectionSummary, APPROVAL_TOKEN_LEN,
};
pub use remediation::{ApprovalAuth, BulkSignupRemediation, RemediationError};
pub use scheduler::BulkSignupScheduler;

use botsentry_common::types::AlertId;

/// Mount point of the admin security API
pub const ADMIN_SECURITY_BASE: &str = "/api/v1/admin/security";

/// Path of the approve endpoint for an alert
pub fn approve_path(alert_id: AlertId) -> String {
    format!("{}/bulk-signups/{}/approve", ADMIN_SECURITY_BASE, alert_id)
}
