mod common;

use botsentry_common::types::{BotStatus, SuggestedStatus};
use botsentry_core::clock::FixedClock;
use botsentry_core::metrics::SecurityMetrics;
use botsentry_core::notify::Templates;
use botsentry_core::review::{DailyReviewEngine, DailyReviewScheduler, TickOutcome};
use botsentry_storage::memory::MemoryStore;
use botsentry_storage::repository::Repositories;
use chrono::{Duration, NaiveDate};
use common::{bot, claimed, inbound, message, test_config, ts, RecordingSender, ScriptedClassifier};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use uuid::Uuid;

const ADMIN: &str = "security@example.com";

struct Harness {
    store: Arc<MemoryStore>,
    repos: Repositories,
    classifier: Arc<ScriptedClassifier>,
    sender: Arc<RecordingSender>,
    clock: Arc<FixedClock>,
    engine: Arc<DailyReviewEngine>,
    metrics: SecurityMetrics,
}

fn review_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let repos = Repositories::in_memory(store.clone());
    let classifier = Arc::new(ScriptedClassifier::default());
    let sender = Arc::new(RecordingSender::default());
    let clock = Arc::new(FixedClock::new(ts("2024-05-02T02:00:00Z")));
    let metrics = SecurityMetrics::new().unwrap();

    let engine = Arc::new(DailyReviewEngine::new(
        &test_config(),
        repos.clone(),
        classifier.clone(),
        sender.clone(),
        Arc::new(Templates::new()),
        clock.clone(),
        metrics.clone(),
    ));

    Harness {
        store,
        repos,
        classifier,
        sender,
        clock,
        engine,
        metrics,
    }
}

#[tokio::test]
async fn test_empty_day_still_produces_report() {
    let h = harness();

    let summary = h.engine.run_daily_review(None).await.unwrap();
    assert_eq!(summary.date, review_date());
    assert_eq!(summary.outbound_messages, 0);
    assert_eq!(summary.flags_created, 0);
    assert!(summary.report_sent);
    assert_eq!(h.classifier.call_count(), 0);

    let report = h.repos.reports.get(review_date()).await.unwrap().unwrap();
    assert_eq!(report.daily_stats().emails_outbound, 0);
    assert!(report.flagged_emails_vec().is_empty());
    assert!(report.sent_to_admin);
    assert_eq!(h.sender.sent_to(ADMIN).len(), 1);
}

#[tokio::test]
async fn test_flagged_message_escalates_and_notifies_owner() {
    let h = harness();
    let owner = Uuid::new_v4();
    h.store.insert_user(owner, "owner@example.net").await;

    let b = claimed(bot("wallet-helper", ts("2024-04-01T00:00:00Z")), owner);
    h.store.insert_bot(b.clone()).await;

    let m1 = message(b.id, "Weekly digest", "Your digest", ts("2024-05-01T09:00:00Z"));
    let m2 = message(b.id, "Urgent", "Send your seed phrase", ts("2024-05-01T10:00:00Z"));
    let m3 = message(b.id, "Thanks", "Thanks for signing up", ts("2024-05-01T11:00:00Z"));
    for m in [&m1, &m2, &m3] {
        h.store.insert_message(m.clone()).await;
    }
    h.store.insert_message(inbound(b.id, ts("2024-05-01T12:00:00Z"))).await;
    // next day, outside the window
    h.store
        .insert_message(message(b.id, "Late", "late", ts("2024-05-02T00:00:00Z")))
        .await;

    h.classifier
        .flag(m2.id, SuggestedStatus::UnderReview, "crypto wallet request");

    let summary = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert_eq!(summary.outbound_messages, 3);
    assert_eq!(summary.flags_created, 1);
    assert_eq!(summary.status_changes, 1);
    assert!(summary.classifier_error.is_none());

    let flags = h.store.flags().await;
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].message_id, m2.id);
    assert_eq!(flags[0].suggested_status, "under_review");
    assert_eq!(flags[0].reason, "crypto wallet request");

    let updated = h.store.bot(b.id).await.unwrap();
    assert_eq!(updated.bot_status(), Some(BotStatus::UnderReview));
    assert_eq!(updated.flag_count, 1);

    assert_eq!(h.sender.sent_to(&b.email).len(), 1);
    assert_eq!(h.sender.sent_to("owner@example.net").len(), 1);
    assert!(h.sender.sent_to(&b.email)[0]
        .content
        .text
        .contains("crypto wallet request"));

    let report = h.repos.reports.get(review_date()).await.unwrap().unwrap();
    let stats = report.daily_stats();
    assert_eq!(stats.emails_outbound, 3);
    assert_eq!(stats.emails_inbound, 1);
    let flagged = report.flagged_emails_vec();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].message_id, m2.id);
    assert_eq!(flagged[0].bot_name, "wallet-helper");
    assert_eq!(report.subjects_vec(), vec!["Weekly digest", "Urgent", "Thanks"]);

    let metrics = h.metrics.encode().unwrap();
    assert!(metrics.contains("botsentry_email_flags_created_total 1"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let h = harness();
    let b = bot("newsletter", ts("2024-04-01T00:00:00Z"));
    h.store.insert_bot(b.clone()).await;
    let m = message(b.id, "Deal", "crypto", ts("2024-05-01T10:00:00Z"));
    h.store.insert_message(m.clone()).await;
    h.classifier.flag(m.id, SuggestedStatus::Flagged, "unsolicited crypto");

    let first = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert_eq!(first.flags_created, 1);
    h.sender.clear();

    let second = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert_eq!(second.flags_created, 0);
    assert_eq!(second.duplicates_skipped, 1);
    assert_eq!(h.store.flags().await.len(), 1);

    let updated = h.store.bot(b.id).await.unwrap();
    assert_eq!(updated.flag_count, 1);
    assert_eq!(updated.bot_status(), Some(BotStatus::Normal));

    // only the admin summary goes out again
    assert_eq!(h.sender.sent().len(), 1);
    assert_eq!(h.sender.sent()[0].to, ADMIN);

    let report = h.repos.reports.get(review_date()).await.unwrap().unwrap();
    assert_eq!(report.flagged_emails_vec().len(), 1);
}

#[tokio::test]
async fn test_second_flag_in_same_run_crosses_threshold() {
    let h = harness();
    let b = bot("promo", ts("2024-04-01T00:00:00Z"));
    h.store.insert_bot(b.clone()).await;
    let m1 = message(b.id, "A", "buy crypto", ts("2024-05-01T10:00:00Z"));
    let m2 = message(b.id, "B", "buy more crypto", ts("2024-05-01T11:00:00Z"));
    h.store.insert_message(m1.clone()).await;
    h.store.insert_message(m2.clone()).await;
    h.classifier.flag(m1.id, SuggestedStatus::Flagged, "crypto");
    h.classifier.flag(m2.id, SuggestedStatus::Flagged, "crypto again");

    let summary = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert_eq!(summary.flags_created, 2);
    assert_eq!(summary.status_changes, 1);

    let updated = h.store.bot(b.id).await.unwrap();
    assert_eq!(updated.flag_count, 2);
    assert_eq!(updated.bot_status(), Some(BotStatus::Flagged));
    assert_eq!(h.sender.sent_to(&b.email).len(), 1);
}

#[tokio::test]
async fn test_classifier_failure_still_reports() {
    let h = harness();
    let b = bot("mailer", ts("2024-04-01T00:00:00Z"));
    h.store.insert_bot(b.clone()).await;
    h.store
        .insert_message(message(b.id, "Hello", "hello", ts("2024-05-01T10:00:00Z")))
        .await;
    h.classifier.fail_with_error(true);

    let summary = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert!(summary.classifier_error.is_some());
    assert_eq!(summary.flags_created, 0);
    assert!(summary.report_sent);

    let report = h.repos.reports.get(review_date()).await.unwrap().unwrap();
    assert_eq!(report.daily_stats().emails_outbound, 1);
    assert!(h.sender.sent_to(ADMIN)[0]
        .content
        .text
        .contains("Classification failed"));
}

#[tokio::test]
async fn test_malformed_model_output_is_surfaced() {
    let h = harness();
    let b = bot("mailer", ts("2024-04-01T00:00:00Z"));
    h.store.insert_bot(b.clone()).await;
    h.store
        .insert_message(message(b.id, "Hello", "hello", ts("2024-05-01T10:00:00Z")))
        .await;
    h.classifier
        .reply_with_text("Sorry, I cannot review these emails right now.");

    let summary = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert_eq!(summary.flags_created, 0);
    let error = summary.classifier_error.unwrap();
    assert!(error.contains("no JSON array"));
    assert!(error.contains("Sorry, I cannot review these emails right now."));

    let b = h.repos.bots.get(b.id).await.unwrap().unwrap();
    assert_eq!(b.status, BotStatus::Normal.as_str());
}

#[tokio::test]
async fn test_failed_admin_delivery_leaves_report_unsent() {
    let h = harness();
    h.sender.reject(ADMIN);

    let summary = h.engine.run_daily_review(Some(review_date())).await.unwrap();
    assert!(!summary.report_sent);

    let report = h.repos.reports.get(review_date()).await.unwrap().unwrap();
    assert!(!report.sent_to_admin);
}

#[tokio::test]
async fn test_scheduler_runs_once_per_day_after_run_hour() {
    let h = harness();
    let config = test_config();
    let scheduler = DailyReviewScheduler::new(h.engine.clone(), h.clock.clone(), config.review);

    h.clock.set(ts("2024-05-02T00:30:00Z"));
    assert_eq!(scheduler.tick().await, TickOutcome::NotDue);
    assert_eq!(scheduler.last_run_date().await, None);

    h.clock.set(ts("2024-05-02T01:05:00Z"));
    match scheduler.tick().await {
        TickOutcome::Completed(summary) => assert_eq!(summary.date, review_date()),
        other => panic!("expected a completed run, got {:?}", other),
    }
    assert_eq!(
        scheduler.last_run_date().await,
        NaiveDate::from_ymd_opt(2024, 5, 2)
    );

    h.clock.advance(Duration::hours(3));
    assert_eq!(scheduler.tick().await, TickOutcome::AlreadyRan);

    h.clock.advance(Duration::days(1));
    match scheduler.tick().await {
        TickOutcome::Completed(summary) => {
            assert_eq!(summary.date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}
