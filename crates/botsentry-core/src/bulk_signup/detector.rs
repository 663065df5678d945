//! Bulk signup cluster detection
//!
//! Recently registered bots are grouped by name prefix. Each bot lands in at
//! most one cluster: candidate prefixes are visited largest set first, then
//! shortest prefix, then alphabetically, and bots already taken by an earlier
//! prefix are removed from later ones.

use super::approve_path;
use crate::clock::Clock;
use crate::metrics::SecurityMetrics;
use crate::notify::{EmailSender, OutboundEmail, Templates};
use botsentry_common::config::{BulkSignupConfig, Config};
use botsentry_common::types::{AlertId, BotId};
use botsentry_common::Result;
use botsentry_storage::models::{Bot, BulkSignupAlert, CreateBulkSignupAlert, NewSecurityEvent};
use botsentry_storage::repository::Repositories;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Length of the one-time approval token
pub const APPROVAL_TOKEN_LEN: usize = 48;

const SEPARATORS: [char; 2] = ['-', '_'];

/// A group of bots that passed every cluster filter
#[derive(Debug, Clone)]
pub struct Cluster {
    pub prefix: String,
    pub sender_prefix: String,
    pub bots: Vec<Bot>,
    pub ips: Vec<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub claimed_count: usize,
}

impl Cluster {
    pub fn bot_ids(&self) -> Vec<BotId> {
        self.bots.iter().map(|b| b.id).collect()
    }

    pub fn signature(&self) -> String {
        cluster_signature(&self.prefix, self.window_start, self.window_end)
    }
}

/// Result of one detection run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub bots_scanned: usize,
    pub clusters_found: usize,
    pub alerts_created: Vec<AlertId>,
    pub duplicates_skipped: usize,
    pub emails_sent: usize,
}

fn strip_trailing(candidate: &str) -> &str {
    candidate
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .trim_end_matches(SEPARATORS)
}

/// Candidate name prefixes for one bot name
pub fn candidate_prefixes(name: &str, min_len: usize) -> BTreeSet<String> {
    let lower = name.trim().to_lowercase();
    let mut prefixes = BTreeSet::new();

    let mut push = |raw: &str| {
        let candidate = strip_trailing(raw);
        if candidate.chars().count() >= min_len {
            prefixes.insert(candidate.to_string());
        }
    };

    for (idx, c) in lower.char_indices() {
        if SEPARATORS.contains(&c) && idx > 0 {
            push(&lower[..idx]);
        }
    }
    push(&lower);

    prefixes
}

/// Longest common prefix of the lowercased names, without trailing separators
pub fn common_sender_prefix<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut iter = names.into_iter().map(|n| n.trim().to_lowercase());
    let Some(first) = iter.next() else {
        return String::new();
    };

    let mut prefix: Vec<char> = first.chars().collect();
    for name in iter {
        let common = prefix
            .iter()
            .zip(name.chars())
            .take_while(|(a, b)| *a == b)
            .count();
        prefix.truncate(common);
        if prefix.is_empty() {
            break;
        }
    }

    prefix
        .into_iter()
        .collect::<String>()
        .trim_end_matches(|c: char| SEPARATORS.contains(&c) || c.is_whitespace())
        .to_string()
}

/// Content-addressed signature of a cluster
pub fn cluster_signature(prefix: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let input = format!(
        "{}|{}|{}",
        prefix,
        start.to_rfc3339_opts(SecondsFormat::Micros, true),
        end.to_rfc3339_opts(SecondsFormat::Micros, true)
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Fresh random alphanumeric approval token
pub fn generate_approval_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(APPROVAL_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Group bots by prefix with greedy largest-first assignment
pub fn group_by_prefix(bots: &[Bot], min_cluster_size: usize, min_prefix_len: usize) -> Vec<(String, Vec<usize>)> {
    let mut by_prefix: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for (idx, bot) in bots.iter().enumerate() {
        for prefix in candidate_prefixes(&bot.name, min_prefix_len) {
            by_prefix.entry(prefix).or_default().insert(idx);
        }
    }

    let mut candidates: Vec<(String, BTreeSet<usize>)> = by_prefix
        .into_iter()
        .filter(|(_, members)| members.len() >= min_cluster_size)
        .collect();

    candidates.sort_by(|(a_prefix, a), (b_prefix, b)| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a_prefix.chars().count().cmp(&b_prefix.chars().count()))
            .then_with(|| a_prefix.cmp(b_prefix))
    });

    let mut assigned: HashSet<usize> = HashSet::new();
    let mut groups = Vec::new();
    for (prefix, members) in candidates {
        let remaining: Vec<usize> = members
            .into_iter()
            .filter(|idx| !assigned.contains(idx))
            .collect();
        if remaining.len() >= min_cluster_size {
            assigned.extend(remaining.iter().copied());
            groups.push((prefix, remaining));
        }
    }
    groups
}

/// Find clusters that pass the size, IP diversity and time window filters
pub fn find_clusters(bots: &[Bot], config: &BulkSignupConfig) -> Vec<Cluster> {
    let max_window = Duration::minutes(config.max_window_minutes);

    group_by_prefix(bots, config.min_cluster_size, config.min_prefix_len)
        .into_iter()
        .filter_map(|(prefix, members)| {
            let mut members: Vec<Bot> = members.into_iter().map(|idx| bots[idx].clone()).collect();
            members.sort_by(|a, b| match a.created_at.cmp(&b.created_at) {
                Ordering::Equal => a.id.cmp(&b.id),
                other => other,
            });

            let ips: Vec<String> = members
                .iter()
                .filter_map(|b| b.registration_ip.as_deref())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if ips.len() < config.min_distinct_ips {
                return None;
            }

            let window_start = members.first()?.created_at;
            let window_end = members.last()?.created_at;
            if window_end - window_start > max_window {
                return None;
            }

            Some(Cluster {
                sender_prefix: common_sender_prefix(members.iter().map(|b| b.sender_name.as_str())),
                claimed_count: members.iter().filter(|b| b.is_claimed()).count(),
                prefix,
                bots: members,
                ips,
                window_start,
                window_end,
            })
        })
        .collect()
}

#[derive(Serialize)]
struct IpCountRow {
    ip: String,
    count: usize,
}

#[derive(Serialize)]
struct AlertBotRow<'a> {
    name: &'a str,
    email: &'a str,
    created_at: String,
    ip: &'a str,
    claimed: bool,
    status: &'a str,
    flag_count: i32,
}

#[derive(Serialize)]
struct BulkAlertContext<'a> {
    name_prefix: &'a str,
    sender_prefix: &'a str,
    bot_count: usize,
    claimed_count: usize,
    ip_count: usize,
    window_start: String,
    window_end: String,
    approve_url: String,
    admin_url: String,
    ip_counts: Vec<IpCountRow>,
    bots: Vec<AlertBotRow<'a>>,
}

/// IP frequency table, most common first
fn ip_frequency(bots: &[Bot]) -> Vec<IpCountRow> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for ip in bots.iter().filter_map(|b| b.registration_ip.as_deref()) {
        let ip = ip.trim();
        if !ip.is_empty() {
            *counts.entry(ip.to_string()).or_default() += 1;
        }
    }
    let mut rows: Vec<IpCountRow> = counts
        .into_iter()
        .map(|(ip, count)| IpCountRow { ip, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
    rows
}

/// Bulk signup detector
pub struct BulkSignupDetector {
    repos: Repositories,
    sender: Arc<dyn EmailSender>,
    templates: Arc<Templates>,
    clock: Arc<dyn Clock>,
    config: BulkSignupConfig,
    public_base_url: String,
    admin_panel_url: String,
    admin_recipients: Vec<String>,
    metrics: SecurityMetrics,
}

impl BulkSignupDetector {
    pub fn new(
        config: &Config,
        repos: Repositories,
        sender: Arc<dyn EmailSender>,
        templates: Arc<Templates>,
        clock: Arc<dyn Clock>,
        metrics: SecurityMetrics,
    ) -> Self {
        Self {
            repos,
            sender,
            templates,
            clock,
            config: config.bulk_signup.clone(),
            public_base_url: config.links.public_base_url.trim_end_matches('/').to_string(),
            admin_panel_url: config.links.admin_panel_url.trim_end_matches('/').to_string(),
            admin_recipients: config.email.admin_recipients.clone(),
            metrics,
        }
    }

    /// One-click approval link for an alert
    pub fn approve_url(&self, alert: &BulkSignupAlert) -> String {
        format!(
            "{}{}?token={}",
            self.public_base_url,
            approve_path(alert.id),
            alert.approval_token
        )
    }

    /// Admin panel link for an alert
    pub fn admin_url(&self, alert_id: AlertId) -> String {
        format!("{}/bulk-signups/{}", self.admin_panel_url, alert_id)
    }

    /// Scan the lookback window and raise alerts for new clusters
    pub async fn run_detection(&self) -> Result<DetectionSummary> {
        let now = self.clock.now();
        let start = now - Duration::hours(self.config.lookback_hours);
        let bots = self.repos.bots.list_created_between(start, now).await?;

        let mut summary = DetectionSummary {
            bots_scanned: bots.len(),
            ..Default::default()
        };

        if bots.len() < self.config.min_cluster_size {
            info!(
                bots = bots.len(),
                min_cluster_size = self.config.min_cluster_size,
                "Too few recent bots to cluster"
            );
            return Ok(summary);
        }

        let clusters = find_clusters(&bots, &self.config);
        summary.clusters_found = clusters.len();

        for cluster in clusters {
            let signature = cluster.signature();
            if self.repos.bulk_signups.exists_by_signature(&signature).await? {
                summary.duplicates_skipped += 1;
                continue;
            }

            let created = self
                .repos
                .bulk_signups
                .create(CreateBulkSignupAlert {
                    signature,
                    name_prefix: cluster.prefix.clone(),
                    sender_prefix: cluster.sender_prefix.clone(),
                    bot_ids: cluster.bot_ids(),
                    ip_list: cluster.ips.clone(),
                    claimed_count: cluster.claimed_count as i32,
                    window_start: cluster.window_start,
                    window_end: cluster.window_end,
                    approval_token: generate_approval_token(),
                })
                .await?;
            let Some(alert) = created else {
                summary.duplicates_skipped += 1;
                continue;
            };

            self.metrics.bulk_alerts_created.inc();
            summary.alerts_created.push(alert.id);
            warn!(
                alert_id = %alert.id,
                prefix = %alert.name_prefix,
                bots = alert.bot_count,
                ips = alert.ip_list.len(),
                "Bulk signup cluster detected"
            );

            let event = NewSecurityEvent::new("bulk_signup_detected")
                .target("bulk_signup_alert", alert.id)
                .metadata(serde_json::json!({
                    "namePrefix": alert.name_prefix,
                    "botCount": alert.bot_count,
                    "ipList": alert.ip_list,
                }));
            if let Err(e) = self.repos.events.log_event(event).await {
                warn!(alert_id = %alert.id, "Failed to log security event: {}", e);
            }

            summary.emails_sent += self.send_alert_email(&alert, &cluster).await;
        }

        info!(
            bots_scanned = summary.bots_scanned,
            clusters = summary.clusters_found,
            alerts_created = summary.alerts_created.len(),
            duplicates_skipped = summary.duplicates_skipped,
            "Bulk signup detection completed"
        );

        Ok(summary)
    }

    /// Returns the number of recipients that accepted the alert
    async fn send_alert_email(&self, alert: &BulkSignupAlert, cluster: &Cluster) -> usize {
        if self.admin_recipients.is_empty() {
            warn!(alert_id = %alert.id, "No admin recipients configured, alert email not sent");
            return 0;
        }

        let ctx = BulkAlertContext {
            name_prefix: &alert.name_prefix,
            sender_prefix: &alert.sender_prefix,
            bot_count: cluster.bots.len(),
            claimed_count: cluster.claimed_count,
            ip_count: cluster.ips.len(),
            window_start: cluster.window_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            window_end: cluster.window_end.to_rfc3339_opts(SecondsFormat::Secs, true),
            approve_url: self.approve_url(alert),
            admin_url: self.admin_url(alert.id),
            ip_counts: ip_frequency(&cluster.bots),
            bots: cluster
                .bots
                .iter()
                .map(|b| AlertBotRow {
                    name: &b.name,
                    email: &b.email,
                    created_at: b.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ip: b.registration_ip.as_deref().unwrap_or("unknown"),
                    claimed: b.is_claimed(),
                    status: &b.status,
                    flag_count: b.flag_count,
                })
                .collect(),
        };

        let subject = format!(
            "Bulk signup detected: {} bots matching \"{}\"",
            cluster.bots.len(),
            alert.name_prefix
        );
        let content = match self.templates.render_email("bulk_alert", subject, &ctx) {
            Ok(content) => content,
            Err(e) => {
                warn!(alert_id = %alert.id, "Failed to render bulk signup alert: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for to in &self.admin_recipients {
            match self.sender.send(OutboundEmail::new(to.clone(), content.clone())).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(alert_id = %alert.id, to = %to, "Failed to send bulk signup alert: {}", e),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn bot(name: &str, ip: &str, minutes: i64) -> Bot {
        let base = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Bot {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sender_name: name.to_string(),
            email: format!("{}@bots.example", name),
            registration_ip: Some(ip.to_string()),
            verified: true,
            status: "normal".to_string(),
            flag_count: 0,
            owner_user_id: None,
            claimed_at: None,
            created_at: base + Duration::minutes(minutes),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_candidate_prefixes() {
        assert_eq!(
            candidate_prefixes("Acme-Bot-07", 4),
            set(&["acme", "acme-bot"])
        );
        assert_eq!(candidate_prefixes("promo_mailer42", 4), set(&["promo", "promo_mailer"]));
        // short tokens are dropped
        assert_eq!(candidate_prefixes("ab-cd-123", 4), set(&["ab-cd"]));
        assert!(candidate_prefixes("x1", 4).is_empty());
    }

    #[test]
    fn test_common_sender_prefix() {
        assert_eq!(
            common_sender_prefix(["Acme Bot 1", "acme bot 2", "ACME Bot 3"]),
            "acme bot"
        );
        assert_eq!(common_sender_prefix(["alpha", "beta"]), "");
        assert_eq!(common_sender_prefix(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_signature_is_deterministic() {
        let start = Utc::now();
        let end = start + Duration::minutes(5);
        assert_eq!(
            cluster_signature("acme", start, end),
            cluster_signature("acme", start, end)
        );
        assert_ne!(
            cluster_signature("acme", start, end),
            cluster_signature("acm", start, end)
        );
        assert_eq!(cluster_signature("acme", start, end).len(), 64);
    }

    #[test]
    fn test_token_shape() {
        let token = generate_approval_token();
        assert_eq!(token.len(), APPROVAL_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_approval_token());
    }

    #[test]
    fn test_greedy_assignment_prefers_largest_then_shortest() {
        // five "shop-deals-N" and three "shop-news-N": "shop" covers all eight
        let mut bots: Vec<Bot> = (0..5).map(|i| bot(&format!("shop-deals-{}", i), "1.1.1.1", i)).collect();
        bots.extend((0..3).map(|i| bot(&format!("shop-news-{}", i), "2.2.2.2", i)));

        let groups = group_by_prefix(&bots, 5, 4);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "shop");
        assert_eq!(groups[0].1.len(), 8);
    }

    #[test]
    fn test_bot_lands_in_one_cluster_only() {
        // "alpha" and "alpha-beta" both reach 5; "alpha" wins and takes everything
        let bots: Vec<Bot> = (0..6)
            .map(|i| bot(&format!("alpha-beta-{}", i), "1.1.1.1", i))
            .collect();
        let groups = group_by_prefix(&bots, 5, 4);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "alpha");
    }

    #[test]
    fn test_find_clusters_filters_ips_and_window() {
        let config = BulkSignupConfig::default();

        let single_ip: Vec<Bot> = (0..6)
            .map(|i| bot(&format!("spammer-{}", i), "9.9.9.9", i))
            .collect();
        assert!(find_clusters(&single_ip, &config).is_empty());

        let slow: Vec<Bot> = (0..6)
            .map(|i| bot(&format!("spammer-{}", i), &format!("9.9.9.{}", i), i * 20))
            .collect();
        assert!(find_clusters(&slow, &config).is_empty());

        let fast: Vec<Bot> = (0..6)
            .map(|i| bot(&format!("spammer-{}", i), &format!("9.9.9.{}", i % 3), i * 5))
            .collect();
        let clusters = find_clusters(&fast, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].ips.len(), 3);
        assert_eq!(clusters[0].window_end - clusters[0].window_start, Duration::minutes(25));
        assert_eq!(clusters[0].sender_prefix, "spammer");
    }

    #[test]
    fn test_ip_frequency_sorted_by_count() {
        let bots = vec![
            bot("a-1", "10.0.0.2", 0),
            bot("a-2", "10.0.0.1", 0),
            bot("a-3", "10.0.0.2", 0),
        ];
        let rows = ip_frequency(&bots);
        assert_eq!(rows[0].ip, "10.0.0.2");
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[1].ip, "10.0.0.1");
    }
}
