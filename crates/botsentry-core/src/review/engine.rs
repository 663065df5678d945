//! Daily review engine
//!
//! One review cycle covers a single UTC day: classify every outbound
//! message, record flags, escalate bots, persist the day's report and mail
//! the admin summary. Re-running a date is safe because flags are unique per
//! message and the report is upserted by date.

use super::status::BotStatusMachine;
use crate::classifier::{ClassifierInput, ContentClassifier};
use crate::clock::Clock;
use crate::metrics::SecurityMetrics;
use crate::notify::{EmailSender, OutboundEmail, OwnerNotifier, Templates};
use botsentry_common::config::Config;
use botsentry_common::types::{BotId, MessageDirection, MessageId};
use botsentry_common::{Error, Result};
use botsentry_storage::models::{
    truncate_chars, Bot, BotMessage, CreateEmailFlag, DailyStats, FlaggedEmailReport,
    UpsertSecurityReport, REPORT_BODY_PREVIEW_CHARS, REPORT_MAX_SUBJECTS,
};
use botsentry_storage::repository::Repositories;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of one review cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub date: NaiveDate,
    pub outbound_messages: usize,
    pub verdicts: usize,
    pub flags_created: usize,
    pub duplicates_skipped: usize,
    pub status_changes: usize,
    pub report_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_error: Option<String>,
}

#[derive(Serialize)]
struct AdminSummaryContext<'a> {
    date: String,
    stats: &'a DailyStats,
    flagged: &'a [FlaggedEmailReport],
    classifier_error: Option<&'a str>,
    admin_url: &'a str,
}

/// Half-open `[start, end)` bounds of a UTC day
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

/// Daily review engine
pub struct DailyReviewEngine {
    repos: Repositories,
    classifier: Arc<dyn ContentClassifier>,
    status_machine: BotStatusMachine,
    sender: Arc<dyn EmailSender>,
    templates: Arc<Templates>,
    clock: Arc<dyn Clock>,
    admin_recipients: Vec<String>,
    admin_url: String,
    metrics: SecurityMetrics,
}

impl DailyReviewEngine {
    pub fn new(
        config: &Config,
        repos: Repositories,
        classifier: Arc<dyn ContentClassifier>,
        sender: Arc<dyn EmailSender>,
        templates: Arc<Templates>,
        clock: Arc<dyn Clock>,
        metrics: SecurityMetrics,
    ) -> Self {
        let notifier = Arc::new(OwnerNotifier::new(
            repos.bots.clone(),
            sender.clone(),
            templates.clone(),
            config.links.clone(),
            metrics.clone(),
        ));
        let status_machine = BotStatusMachine::new(repos.bots.clone(), notifier, metrics.clone());

        Self {
            repos,
            classifier,
            status_machine,
            sender,
            templates,
            clock,
            admin_recipients: config.email.admin_recipients.clone(),
            admin_url: config.links.admin_panel_url.clone(),
            metrics,
        }
    }

    /// Yesterday in UTC according to the engine's clock
    pub fn default_target_date(&self) -> Result<NaiveDate> {
        self.clock
            .now()
            .date_naive()
            .pred_opt()
            .ok_or_else(|| Error::Internal("Date out of range".to_string()))
    }

    /// Run one review cycle for `target`, or for yesterday when omitted
    pub async fn run_daily_review(&self, target: Option<NaiveDate>) -> Result<ReviewSummary> {
        self.metrics.review_runs.inc();

        let date = match target {
            Some(date) => date,
            None => self.default_target_date()?,
        };

        let result = self.review_date(date).await;
        if let Err(ref e) = result {
            self.metrics.review_failures.inc();
            error!(%date, "Daily review failed: {}", e);
        }
        result
    }

    async fn review_date(&self, date: NaiveDate) -> Result<ReviewSummary> {
        let (start, end) = day_window(date);
        info!(%date, %start, %end, "Starting daily review");

        let messages = self.repos.messages.list_outbound_between(start, end).await?;
        let bot_ids: Vec<BotId> = messages
            .iter()
            .map(|m| m.bot_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut bots: HashMap<BotId, Bot> = self
            .repos
            .bots
            .find_by_ids(&bot_ids)
            .await?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        if messages.is_empty() {
            info!(%date, "No outbound messages in window");
        }

        let mut summary = ReviewSummary {
            date,
            outbound_messages: messages.len(),
            verdicts: 0,
            flags_created: 0,
            duplicates_skipped: 0,
            status_changes: 0,
            report_sent: false,
            classifier_error: None,
        };

        let inputs: Vec<ClassifierInput> = messages
            .iter()
            .map(|m| ClassifierInput {
                id: m.id,
                recipient: m.recipient.clone(),
                subject: m.subject.clone(),
                body: m.body.clone(),
            })
            .collect();

        let verdicts = match self.classifier.classify(&inputs).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                self.metrics.classifier_failures.inc();
                match e.raw_output() {
                    Some(raw) => warn!(
                        %date,
                        raw = %raw,
                        "Classifier output rejected, continuing with no verdicts: {}",
                        e
                    ),
                    None => warn!(%date, "Classifier failed, continuing with no verdicts: {}", e),
                }
                summary.classifier_error = Some(e.to_string());
                Vec::new()
            }
        };
        summary.verdicts = verdicts.len();

        let by_id: HashMap<MessageId, &BotMessage> = messages.iter().map(|m| (m.id, m)).collect();

        for verdict in verdicts {
            let Some(message) = by_id.get(&verdict.message_id) else {
                continue;
            };

            if self.repos.flags.exists_for_message(message.id).await? {
                summary.duplicates_skipped += 1;
                continue;
            }

            let created = self
                .repos
                .flags
                .create(CreateEmailFlag {
                    message_id: message.id,
                    bot_id: message.bot_id,
                    suggested_status: verdict.status,
                    reason: verdict.reason.clone(),
                })
                .await?;
            if created.is_none() {
                summary.duplicates_skipped += 1;
                continue;
            }
            summary.flags_created += 1;
            self.metrics.flags_created.inc();

            let Some(bot) = bots.get_mut(&message.bot_id) else {
                warn!(message_id = %message.id, bot_id = %message.bot_id, "Flagged message has no bot");
                continue;
            };

            match self
                .status_machine
                .apply(bot, verdict.status, &verdict.reason)
                .await
            {
                Ok(transition) if transition.changed() => summary.status_changes += 1,
                Ok(_) => {}
                Err(e) => error!(bot_id = %bot.id, "Failed to apply flag to bot: {}", e),
            }
        }

        let stats = self.gather_stats(&messages, start, end).await?;
        let flagged = self.flagged_emails(&messages, &bots).await?;
        let subjects: Vec<String> = messages
            .iter()
            .take(REPORT_MAX_SUBJECTS)
            .map(|m| m.subject.clone())
            .collect();

        self.repos
            .reports
            .upsert(UpsertSecurityReport {
                report_date: date,
                stats,
                flagged_emails: flagged.clone(),
                subjects,
            })
            .await?;

        summary.report_sent = self
            .send_admin_summary(date, &stats, &flagged, summary.classifier_error.as_deref())
            .await;
        if summary.report_sent {
            self.repos.reports.mark_sent_to_admin(date).await?;
        }

        info!(
            %date,
            outbound = summary.outbound_messages,
            verdicts = summary.verdicts,
            flags_created = summary.flags_created,
            duplicates_skipped = summary.duplicates_skipped,
            status_changes = summary.status_changes,
            report_sent = summary.report_sent,
            "Daily review completed"
        );

        Ok(summary)
    }

    async fn gather_stats(
        &self,
        messages: &[BotMessage],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DailyStats> {
        let inbound = self
            .repos
            .messages
            .count_between(MessageDirection::Inbound, start, end)
            .await?;
        let new_bots = self.repos.bots.count_created_between(start, end).await?;

        Ok(DailyStats {
            emails_inbound: inbound,
            emails_outbound: messages.len() as i64,
            new_bots: new_bots.total,
            claimed_bots: new_bots.claimed,
        })
    }

    /// Snapshot every persisted flag on the window's messages, in message order
    async fn flagged_emails(
        &self,
        messages: &[BotMessage],
        bots: &HashMap<BotId, Bot>,
    ) -> Result<Vec<FlaggedEmailReport>> {
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        let flags: HashMap<MessageId, _> = self
            .repos
            .flags
            .list_for_messages(&ids)
            .await?
            .into_iter()
            .map(|f| (f.message_id, f))
            .collect();

        Ok(messages
            .iter()
            .filter_map(|m| {
                let flag = flags.get(&m.id)?;
                let bot = bots.get(&m.bot_id);
                Some(FlaggedEmailReport {
                    message_id: m.id,
                    bot_id: m.bot_id,
                    bot_name: bot.map(|b| b.name.clone()).unwrap_or_default(),
                    bot_address: bot.map(|b| b.email.clone()).unwrap_or_default(),
                    recipient: m.recipient.clone(),
                    subject: m.subject.clone(),
                    body_preview: truncate_chars(&m.body, REPORT_BODY_PREVIEW_CHARS),
                    suggested_status: flag.suggested_status.clone(),
                    reason: flag.reason.clone(),
                })
            })
            .collect())
    }

    /// Returns true only if every admin recipient accepted the summary
    async fn send_admin_summary(
        &self,
        date: NaiveDate,
        stats: &DailyStats,
        flagged: &[FlaggedEmailReport],
        classifier_error: Option<&str>,
    ) -> bool {
        if self.admin_recipients.is_empty() {
            warn!(%date, "No admin recipients configured, summary not sent");
            return false;
        }

        let ctx = AdminSummaryContext {
            date: date.to_string(),
            stats,
            flagged,
            classifier_error,
            admin_url: &self.admin_url,
        };
        let subject = format!(
            "Bot security report {}: {} flagged email(s)",
            date,
            flagged.len()
        );
        let content = match self.templates.render_email("admin_summary", subject, &ctx) {
            Ok(content) => content,
            Err(e) => {
                error!(%date, "Failed to render admin summary: {}", e);
                return false;
            }
        };

        let mut all_sent = true;
        for to in &self.admin_recipients {
            if let Err(e) = self.sender.send(OutboundEmail::new(to.clone(), content.clone())).await {
                warn!(%date, to = %to, "Failed to send admin summary: {}", e);
                all_sent = false;
            }
        }
        all_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_window_is_half_open_utc_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (start, end) = day_window(date);
        assert_eq!(start.to_rfc3339(), "2024-03-10T00:00:00+00:00");
        assert_eq!(end - start, Duration::days(1));
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }
}
