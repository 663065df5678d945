//! Bot status state machine
//!
//! Statuses only move forward: `normal -> flagged -> under_review -> suspended`.
//! Each new email flag increments the bot's flag count and may escalate the
//! status. Thresholds are applied when a flag is inserted and never
//! recomputed from history.

use crate::metrics::SecurityMetrics;
use crate::notify::OwnerNotifier;
use botsentry_common::types::{BotStatus, SuggestedStatus};
use botsentry_common::{Error, Result};
use botsentry_storage::models::Bot;
use botsentry_storage::repository::BotRepository;
use std::sync::Arc;
use tracing::info;

/// Flag count at which a `normal` bot becomes `flagged`
pub const FLAGGED_THRESHOLD: i32 = 2;

/// Flag count at which a `flagged` bot becomes `under_review`
pub const UNDER_REVIEW_THRESHOLD: i32 = 3;

/// Result of applying one flag to a bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: BotStatus,
    pub next: BotStatus,
    pub flag_count: i32,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

/// Compute the status and flag count after one more flag
pub fn next_status(
    current: BotStatus,
    current_flag_count: i32,
    suggested: SuggestedStatus,
) -> Transition {
    let flag_count = current_flag_count.saturating_add(1);

    let next = match suggested {
        SuggestedStatus::Suspended => BotStatus::Suspended,
        SuggestedStatus::UnderReview => current.max(BotStatus::UnderReview),
        SuggestedStatus::Flagged => match current {
            BotStatus::Normal if flag_count >= FLAGGED_THRESHOLD => BotStatus::Flagged,
            BotStatus::Flagged if flag_count >= UNDER_REVIEW_THRESHOLD => BotStatus::UnderReview,
            other => other,
        },
    };

    Transition {
        previous: current,
        next,
        flag_count,
    }
}

/// Applies flags to bots, persists the result and notifies owners
pub struct BotStatusMachine {
    bots: Arc<dyn BotRepository>,
    notifier: Arc<OwnerNotifier>,
    metrics: SecurityMetrics,
}

impl BotStatusMachine {
    pub fn new(
        bots: Arc<dyn BotRepository>,
        notifier: Arc<OwnerNotifier>,
        metrics: SecurityMetrics,
    ) -> Self {
        Self {
            bots,
            notifier,
            metrics,
        }
    }

    /// Apply one flag to `bot`, updating it in place.
    ///
    /// The owner is notified synchronously when the status changes. A failed
    /// notification is logged and does not undo the status change.
    pub async fn apply(
        &self,
        bot: &mut Bot,
        suggested: SuggestedStatus,
        reason: &str,
    ) -> Result<Transition> {
        let current = bot.bot_status().ok_or_else(|| {
            Error::Validation(format!("Bot {} has unknown status {:?}", bot.id, bot.status))
        })?;

        let transition = next_status(current, bot.flag_count, suggested);
        self.bots
            .update_status(bot.id, transition.next, transition.flag_count)
            .await?;

        bot.status = transition.next.as_str().to_string();
        bot.flag_count = transition.flag_count;

        if transition.changed() {
            info!(
                bot_id = %bot.id,
                from = %transition.previous,
                to = %transition.next,
                flag_count = transition.flag_count,
                "Bot status changed"
            );
            self.metrics
                .status_transitions
                .with_label_values(&[transition.next.as_str()])
                .inc();

            if transition.next != BotStatus::Normal {
                self.notifier
                    .notify_status_change(bot, transition.previous, transition.next, reason)
                    .await;
            }
        }

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(current: BotStatus, count: i32, suggested: SuggestedStatus) -> (BotStatus, i32) {
        let tr = next_status(current, count, suggested);
        (tr.next, tr.flag_count)
    }

    #[test]
    fn test_suspended_always_wins() {
        for current in [
            BotStatus::Normal,
            BotStatus::Flagged,
            BotStatus::UnderReview,
            BotStatus::Suspended,
        ] {
            assert_eq!(t(current, 0, SuggestedStatus::Suspended).0, BotStatus::Suspended);
        }
    }

    #[test]
    fn test_under_review_never_downgrades() {
        assert_eq!(
            t(BotStatus::Normal, 0, SuggestedStatus::UnderReview),
            (BotStatus::UnderReview, 1)
        );
        assert_eq!(
            t(BotStatus::Suspended, 4, SuggestedStatus::UnderReview),
            (BotStatus::Suspended, 5)
        );
    }

    #[test]
    fn test_flagged_thresholds() {
        // first flag only counts
        assert_eq!(t(BotStatus::Normal, 0, SuggestedStatus::Flagged), (BotStatus::Normal, 1));
        assert_eq!(t(BotStatus::Normal, 1, SuggestedStatus::Flagged), (BotStatus::Flagged, 2));
        assert_eq!(t(BotStatus::Flagged, 1, SuggestedStatus::Flagged), (BotStatus::Flagged, 2));
        assert_eq!(
            t(BotStatus::Flagged, 2, SuggestedStatus::Flagged),
            (BotStatus::UnderReview, 3)
        );
        assert_eq!(
            t(BotStatus::UnderReview, 7, SuggestedStatus::Flagged),
            (BotStatus::UnderReview, 8)
        );
    }

    #[test]
    fn test_normal_with_high_count_only_reaches_flagged() {
        // a normal bot never skips straight to under_review on a "flagged" verdict
        assert_eq!(t(BotStatus::Normal, 5, SuggestedStatus::Flagged), (BotStatus::Flagged, 6));
    }

    #[test]
    fn test_monotonic_over_all_inputs() {
        let statuses = [
            BotStatus::Normal,
            BotStatus::Flagged,
            BotStatus::UnderReview,
            BotStatus::Suspended,
        ];
        let suggestions = [
            SuggestedStatus::Flagged,
            SuggestedStatus::UnderReview,
            SuggestedStatus::Suspended,
        ];
        for current in statuses {
            for count in 0..6 {
                for suggested in suggestions {
                    let tr = next_status(current, count, suggested);
                    assert!(tr.next >= current);
                    assert_eq!(tr.flag_count, count + 1);
                }
            }
        }
    }
}
