//! Owner notifications on bot status changes

use super::sender::{EmailSender, OutboundEmail};
use super::templates::Templates;
use crate::metrics::SecurityMetrics;
use botsentry_common::config::LinksConfig;
use botsentry_common::types::BotStatus;
use botsentry_storage::models::Bot;
use botsentry_storage::repository::BotRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Delivery counts for one notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct OwnerNoticeContext<'a> {
    headline: &'a str,
    bot_name: &'a str,
    bot_address: &'a str,
    explanation: &'a str,
    previous_status: &'a str,
    new_status: &'a str,
    reason: &'a str,
    action: &'a str,
    support_url: &'a str,
}

struct StatusNotice {
    subject: &'static str,
    headline: &'static str,
    explanation: &'static str,
    action: &'static str,
}

fn status_notice(status: BotStatus) -> Option<StatusNotice> {
    match status {
        BotStatus::Normal => None,
        BotStatus::Flagged => Some(StatusNotice {
            subject: "Your bot has been flagged",
            headline: "Your bot has been flagged for suspicious email",
            explanation: "Our automated review found outgoing email from this bot that looks \
                          suspicious. The bot can still send email, but repeated findings will \
                          lead to a manual review.",
            action: "Check what your bot has been sending and make sure it only sends email its \
                     recipients expect.",
        }),
        BotStatus::UnderReview => Some(StatusNotice {
            subject: "Your bot is under review",
            headline: "Your bot has been placed under review",
            explanation: "Outgoing email from this bot matched patterns we associate with scams. \
                          Our team will review its activity and sending may be restricted in \
                          the meantime.",
            action: "Stop any automated campaigns from this bot and contact support with a \
                     description of what it is used for.",
        }),
        BotStatus::Suspended => Some(StatusNotice {
            subject: "Your bot has been suspended",
            headline: "Your bot has been suspended",
            explanation: "Outgoing email from this bot was classified as fraud or malware. The \
                          bot can no longer send email.",
            action: "Contact support if you want to appeal this decision.",
        }),
    }
}

/// Emails a bot's own mailbox and its claiming owner about status changes
pub struct OwnerNotifier {
    bots: Arc<dyn BotRepository>,
    sender: Arc<dyn EmailSender>,
    templates: Arc<Templates>,
    links: LinksConfig,
    metrics: SecurityMetrics,
}

impl OwnerNotifier {
    pub fn new(
        bots: Arc<dyn BotRepository>,
        sender: Arc<dyn EmailSender>,
        templates: Arc<Templates>,
        links: LinksConfig,
        metrics: SecurityMetrics,
    ) -> Self {
        Self {
            bots,
            sender,
            templates,
            links,
            metrics,
        }
    }

    /// Recipient addresses: the bot itself, then the claiming user if any
    async fn recipients(&self, bot: &Bot) -> Vec<String> {
        let mut recipients = vec![bot.email.clone()];

        if let Some(user_id) = bot.owner_user_id {
            match self.bots.owner_email(user_id).await {
                Ok(Some(email)) if !email.eq_ignore_ascii_case(&bot.email) => recipients.push(email),
                Ok(_) => {}
                Err(e) => warn!(bot_id = %bot.id, %user_id, "Failed to resolve owner email: {}", e),
            }
        }

        recipients
    }

    /// Notify about a transition. Failures are logged and counted, never returned.
    pub async fn notify_status_change(
        &self,
        bot: &Bot,
        previous: BotStatus,
        next: BotStatus,
        reason: &str,
    ) -> NotificationReport {
        let mut report = NotificationReport::default();
        let Some(notice) = status_notice(next) else {
            return report;
        };

        let ctx = OwnerNoticeContext {
            headline: notice.headline,
            bot_name: &bot.name,
            bot_address: &bot.email,
            explanation: notice.explanation,
            previous_status: previous.as_str(),
            new_status: next.as_str(),
            reason,
            action: notice.action,
            support_url: &self.links.support_url,
        };

        let content = match self.templates.render_email(
            "owner_notice",
            format!("{}: {}", notice.subject, bot.name),
            &ctx,
        ) {
            Ok(content) => content,
            Err(e) => {
                warn!(bot_id = %bot.id, "Failed to render owner notice: {}", e);
                self.metrics.owner_notifications.with_label_values(&["failed"]).inc();
                report.failed += 1;
                return report;
            }
        };

        for to in self.recipients(bot).await {
            match self.sender.send(OutboundEmail::new(to.clone(), content.clone())).await {
                Ok(()) => {
                    report.sent += 1;
                    self.metrics.owner_notifications.with_label_values(&["sent"]).inc();
                }
                Err(e) => {
                    report.failed += 1;
                    self.metrics.owner_notifications.with_label_values(&["failed"]).inc();
                    warn!(bot_id = %bot.id, to = %to, "Failed to send owner notice: {}", e);
                }
            }
        }

        info!(
            bot_id = %bot.id,
            from = %previous,
            to = %next,
            sent = report.sent,
            failed = report.failed,
            "Owner notified of status change"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_notice_for_normal() {
        assert!(status_notice(BotStatus::Normal).is_none());
        assert!(status_notice(BotStatus::Suspended).is_some());
    }
}
