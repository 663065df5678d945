//! Hourly poll that runs the daily review once per UTC day

use super::engine::{DailyReviewEngine, ReviewSummary};
use crate::clock::Clock;
use crate::single_flight::SingleFlight;
use botsentry_common::config::ReviewConfig;
use chrono::{NaiveDate, Timelike};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

/// What a single scheduler tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Before the configured hour
    NotDue,
    /// Today's run already happened (or was attempted)
    AlreadyRan,
    /// A run is still in flight
    InFlight,
    Completed(ReviewSummary),
    Failed(String),
}

/// Daily review scheduler
pub struct DailyReviewScheduler {
    engine: Arc<DailyReviewEngine>,
    clock: Arc<dyn Clock>,
    config: ReviewConfig,
    last_run_date: Mutex<Option<NaiveDate>>,
    flight: SingleFlight,
}

impl DailyReviewScheduler {
    pub fn new(engine: Arc<DailyReviewEngine>, clock: Arc<dyn Clock>, config: ReviewConfig) -> Self {
        Self {
            engine,
            clock,
            config,
            last_run_date: Mutex::new(None),
            flight: SingleFlight::new(),
        }
    }

    pub async fn last_run_date(&self) -> Option<NaiveDate> {
        *self.last_run_date.lock().await
    }

    /// Evaluate the schedule once and run the review if due.
    ///
    /// The day is marked as run before the review starts, so a failed run is
    /// not retried automatically; use a forced run for that.
    pub async fn tick(&self) -> TickOutcome {
        let now = self.clock.now();
        let today = now.date_naive();

        if now.hour() < self.config.run_hour_utc {
            return TickOutcome::NotDue;
        }

        let Some(_guard) = self.flight.try_acquire() else {
            debug!("Daily review still running, skipping tick");
            return TickOutcome::InFlight;
        };

        {
            let mut last = self.last_run_date.lock().await;
            if *last == Some(today) {
                return TickOutcome::AlreadyRan;
            }
            *last = Some(today);
        }

        match self.engine.run_daily_review(None).await {
            Ok(summary) => TickOutcome::Completed(summary),
            Err(e) => TickOutcome::Failed(e.to_string()),
        }
    }

    /// Run the polling loop forever
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));

        info!(
            "Daily review scheduler started (interval: {}s, run hour: {:02}:00 UTC)",
            self.config.poll_interval_secs, self.config.run_hour_utc
        );

        loop {
            ticker.tick().await;

            match self.tick().await {
                TickOutcome::Completed(summary) => info!(
                    date = %summary.date,
                    flags_created = summary.flags_created,
                    "Scheduled daily review finished"
                ),
                TickOutcome::Failed(e) => error!("Scheduled daily review failed: {}", e),
                other => debug!(outcome = ?other, "Daily review tick"),
            }
        }
    }
}
