//! Prometheus metrics for the review and bulk signup pipelines

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "botsentry";

/// Counters exported on `/metrics`
#[derive(Clone)]
pub struct SecurityMetrics {
    registry: Registry,
    pub review_runs: IntCounter,
    pub review_failures: IntCounter,
    pub classifier_failures: IntCounter,
    pub flags_created: IntCounter,
    pub status_transitions: IntCounterVec,
    pub owner_notifications: IntCounterVec,
    pub bulk_alerts_created: IntCounter,
    pub bulk_alerts_resolved: IntCounterVec,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

impl SecurityMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let metrics = Self {
            review_runs: counter("review_runs_total", "Daily review cycles started")?,
            review_failures: counter("review_failures_total", "Daily review cycles that failed")?,
            classifier_failures: counter(
                "classifier_failures_total",
                "Classifier calls that returned an error",
            )?,
            flags_created: counter("email_flags_created_total", "Email flags inserted")?,
            status_transitions: counter_vec(
                "bot_status_transitions_total",
                "Bot status changes applied by the state machine",
                &["to"],
            )?,
            owner_notifications: counter_vec(
                "owner_notifications_total",
                "Owner notification emails by outcome",
                &["outcome"],
            )?,
            bulk_alerts_created: counter(
                "bulk_signup_alerts_created_total",
                "Bulk signup alerts created",
            )?,
            bulk_alerts_resolved: counter_vec(
                "bulk_signup_alerts_resolved_total",
                "Bulk signup alerts resolved by action",
                &["action"],
            )?,
            registry,
        };

        metrics.registry.register(Box::new(metrics.review_runs.clone()))?;
        metrics.registry.register(Box::new(metrics.review_failures.clone()))?;
        metrics.registry.register(Box::new(metrics.classifier_failures.clone()))?;
        metrics.registry.register(Box::new(metrics.flags_created.clone()))?;
        metrics.registry.register(Box::new(metrics.status_transitions.clone()))?;
        metrics.registry.register(Box::new(metrics.owner_notifications.clone()))?;
        metrics.registry.register(Box::new(metrics.bulk_alerts_created.clone()))?;
        metrics.registry.register(Box::new(metrics.bulk_alerts_resolved.clone()))?;

        Ok(metrics)
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = SecurityMetrics::new().unwrap();
        metrics.flags_created.inc();
        metrics.status_transitions.with_label_values(&["flagged"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("botsentry_email_flags_created_total 1"));
        assert!(text.contains("botsentry_bot_status_transitions_total{to=\"flagged\"} 1"));
    }
}
