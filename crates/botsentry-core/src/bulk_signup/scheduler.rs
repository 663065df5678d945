//! Periodic bulk signup detection

use super::detector::{BulkSignupDetector, DetectionSummary};
use crate::single_flight::SingleFlight;
use botsentry_common::config::BulkSignupConfig;
use botsentry_common::Result;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, error, info};

pub struct BulkSignupScheduler {
    detector: Arc<BulkSignupDetector>,
    config: BulkSignupConfig,
    flight: SingleFlight,
}

impl BulkSignupScheduler {
    pub fn new(detector: Arc<BulkSignupDetector>, config: BulkSignupConfig) -> Self {
        Self {
            detector,
            config,
            flight: SingleFlight::new(),
        }
    }

    /// Run detection once. Returns `None` if a run is already in flight.
    pub async fn run_once(&self) -> Option<Result<DetectionSummary>> {
        let _guard = self.flight.try_acquire()?;
        Some(self.detector.run_detection().await)
    }

    /// First run after the initial delay, then every `interval_hours`
    pub async fn run(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.interval_hours.max(1) * 3600);
        let start = Instant::now() + Duration::from_secs(self.config.initial_delay_secs);
        let mut ticker = interval_at(start, period);

        info!(
            "Bulk signup scheduler started (initial delay: {}s, interval: {}h)",
            self.config.initial_delay_secs, self.config.interval_hours
        );

        loop {
            ticker.tick().await;

            match self.run_once().await {
                Some(Ok(summary)) => debug!(
                    alerts_created = summary.alerts_created.len(),
                    "Scheduled bulk signup detection finished"
                ),
                Some(Err(e)) => error!("Bulk signup detection failed: {}", e),
                None => debug!("Bulk signup detection still running, skipping tick"),
            }
        }
    }
}
