use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use botsentry_api::auth::hash_api_key;
use botsentry_api::{create_router, AppState};
use botsentry_common::types::BotStatus;
use botsentry_common::Config;
use botsentry_core::{
    AnthropicClassifier, BulkSignupDetector, BulkSignupRemediation, DailyReviewEngine, FixedClock,
    SecurityMetrics, SmtpEmailSender, Templates,
};
use botsentry_storage::memory::MemoryStore;
use botsentry_storage::models::{AdminApiKey, Bot};
use botsentry_storage::Repositories;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const ADMIN_KEY: &str = "bsk_test_admin_key_0001";
const READ_ONLY_KEY: &str = "bsk_read_only_key_0002";
const BASE: &str = "/api/v1/admin/security";

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn api_key(raw: &str, name: &str, scopes: Value) -> AdminApiKey {
    AdminApiKey {
        id: Uuid::new_v4(),
        name: name.to_string(),
        key_hash: hash_api_key(raw),
        key_prefix: raw[..8].to_string(),
        scopes,
        expires_at: None,
        last_used_at: None,
        created_at: ts("2024-01-01T00:00:00Z"),
    }
}

fn bot(name: &str, ip: &str, created_at: DateTime<Utc>) -> Bot {
    Bot {
        id: Uuid::new_v4(),
        name: name.to_string(),
        sender_name: name.to_string(),
        email: format!("{}@bots.example.com", name),
        registration_ip: Some(ip.to_string()),
        verified: true,
        status: "normal".to_string(),
        flag_count: 0,
        owner_user_id: None,
        claimed_at: None,
        created_at,
    }
}

async fn setup() -> (TestServer, Arc<MemoryStore>) {
    let mut config = Config::default();
    config.links.public_base_url = "https://bots.example.com".to_string();

    let store = MemoryStore::new();
    store
        .insert_api_key(api_key(ADMIN_KEY, "ops", json!(["admin:security"])))
        .await;
    store
        .insert_api_key(api_key(READ_ONLY_KEY, "viewer", json!(["read"])))
        .await;

    let repos = Repositories::in_memory(store.clone());
    let clock = Arc::new(FixedClock::new(ts("2024-05-01T12:00:00Z")));
    let metrics = SecurityMetrics::new().unwrap();
    let templates = Arc::new(Templates::new());
    let sender = Arc::new(SmtpEmailSender::new(config.email.clone()));
    let classifier = Arc::new(AnthropicClassifier::new(config.classifier.clone()).unwrap());

    let engine = Arc::new(DailyReviewEngine::new(
        &config,
        repos.clone(),
        classifier,
        sender.clone(),
        templates.clone(),
        clock.clone(),
        metrics.clone(),
    ));
    let detector = Arc::new(BulkSignupDetector::new(
        &config,
        repos.clone(),
        sender,
        templates.clone(),
        clock.clone(),
        metrics.clone(),
    ));
    let remediation = Arc::new(BulkSignupRemediation::new(
        repos.clone(),
        clock,
        config.bulk_signup.ip_block_days,
        metrics.clone(),
    ));

    let state = AppState {
        repos,
        engine,
        detector,
        remediation,
        templates,
        metrics,
        db_pool: None,
        admin_panel_url: config.links.admin_panel_url.clone(),
        docs_enabled: true,
    };

    (TestServer::new(create_router(state)).unwrap(), store)
}

fn bearer(key: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", key)).unwrap()
}

fn x_api_key() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

async fn seed_cluster(store: &MemoryStore) {
    for i in 0..6 {
        store
            .insert_bot(bot(
                &format!("spam-relay-{}", i),
                &format!("192.0.2.{}", i % 3 + 1),
                ts("2024-05-01T10:00:00Z") + Duration::minutes(i * 4),
            ))
            .await;
    }
}

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let (server, _) = setup().await;

    let res = server.get("/health").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>()["status"], "healthy");

    assert_eq!(server.get("/health/ready").await.status_code(), StatusCode::OK);

    let res = server.get("/metrics").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.text().contains("botsentry_review_runs_total"));

    let res = server.get("/openapi.json").await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_require_scoped_key() {
    let (server, _) = setup().await;

    let res = server.get(&format!("{}/stats", BASE)).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.json::<Value>()["error"], "UNAUTHORIZED");

    let res = server
        .get(&format!("{}/stats", BASE))
        .add_header(header::AUTHORIZATION, bearer("bsk_test_wrong_key"))
        .await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

    let res = server
        .get(&format!("{}/stats", BASE))
        .add_header(x_api_key(), HeaderValue::from_static(READ_ONLY_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let res = server
        .get(&format!("{}/stats", BASE))
        .add_header(x_api_key(), HeaderValue::from_static(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json::<Value>();
    assert_eq!(body["botsByStatus"]["suspended"], 0);
    assert_eq!(body["totalFlags"], 0);
}

#[tokio::test]
async fn test_report_lookup_validates_date() {
    let (server, _) = setup().await;

    let res = server
        .get(&format!("{}/reports/not-a-date", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.json::<Value>()["error"], "VALIDATION_ERROR");

    let res = server
        .get(&format!("{}/reports/2024-04-30", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_force_review_creates_report() {
    let (server, _) = setup().await;

    let res = server
        .post(&format!("{}/force-review", BASE))
        .add_query_param("date", "2024-04-30")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let summary = res.json::<Value>();
    assert_eq!(summary["date"], "2024-04-30");
    assert_eq!(summary["outboundMessages"], 0);
    // SMTP is not configured in tests
    assert_eq!(summary["reportSent"], false);

    let res = server
        .get(&format!("{}/reports/2024-04-30", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>()["stats"]["emailsOutbound"], 0);

    let res = server
        .post(&format!("{}/force-review", BASE))
        .add_query_param("date", "04/30/2024")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_flagged_bots_filters() {
    let (server, store) = setup().await;
    let mut flagged = bot("noisy", "192.0.2.9", ts("2024-04-01T00:00:00Z"));
    flagged.status = BotStatus::Flagged.as_str().to_string();
    flagged.flag_count = 2;
    store.insert_bot(flagged.clone()).await;
    store
        .insert_bot(bot("quiet", "192.0.2.10", ts("2024-04-01T00:00:00Z")))
        .await;

    let res = server
        .get(&format!("{}/flagged-bots", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json::<Value>();
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["name"], "noisy");

    let res = server
        .get(&format!("{}/flagged-bots", BASE))
        .add_query_param("status", "normal")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = server
        .get(&format!("{}/flagged-bots", BASE))
        .add_query_param("status", "banned")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = server
        .get(&format!("{}/flags/{}", BASE, flagged.id))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>()["bot"]["flagCount"], 2);

    let res = server
        .get(&format!("{}/flags/{}", BASE, Uuid::new_v4()))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_signup_pagination_is_validated() {
    let (server, _) = setup().await;

    let res = server
        .get(&format!("{}/bulk-signups", BASE))
        .add_query_param("pageSize", "500")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = server
        .get(&format!("{}/bulk-signups", BASE))
        .add_query_param("page", "0")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = server
        .get(&format!("{}/bulk-signups", BASE))
        .add_query_param("status", "pending")
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json::<Value>();
    assert_eq!(body["total"], 0);
    assert_eq!(body["pageSize"], 20);
}

#[tokio::test]
async fn test_token_approval_flow() {
    let (server, store) = setup().await;
    seed_cluster(&store).await;

    let res = server
        .post(&format!("{}/bulk-signups/force-scan", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>()["alertsCreated"].as_array().unwrap().len(), 1);

    let alert = store.alerts().await.remove(0);

    let res = server
        .get(&format!("{}/bulk-signups/{}", BASE, alert.id))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let detail = res.json::<Value>();
    assert_eq!(detail["bots"].as_array().unwrap().len(), 6);
    assert_eq!(detail["alert"]["botCount"], 6);
    assert!(detail["alert"].get("approvalToken").is_none());

    // no credentials at all
    let res = server
        .get(&format!("{}/bulk-signups/{}/approve", BASE, alert.id))
        .await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

    let res = server
        .get(&format!("{}/bulk-signups/{}/approve", BASE, alert.id))
        .add_query_param("token", "wrong")
        .await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(res.text().contains("Approval failed"));

    let res = server
        .get(&format!("{}/bulk-signups/{}/approve", BASE, alert.id))
        .add_query_param("token", &alert.approval_token)
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let page = res.text();
    assert!(page.contains("Bulk signup approved"));
    assert!(page.contains("Bots suspended: 6"));

    assert_eq!(store.ip_blocks().await.len(), 3);

    let res = server
        .post(&format!("{}/bulk-signups/{}/approve", BASE, alert.id))
        .add_query_param("token", &alert.approval_token)
        .add_header(header::ACCEPT, HeaderValue::from_static("application/json"))
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    let body = res.json::<Value>();
    assert_eq!(body["error"], "ALREADY_RESOLVED");
    assert_eq!(body["message"], "Alert already approved");
}

#[tokio::test]
async fn test_admin_approval_returns_json() {
    let (server, store) = setup().await;
    seed_cluster(&store).await;
    server
        .post(&format!("{}/bulk-signups/force-scan", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    let alert = store.alerts().await.remove(0);

    let res = server
        .post(&format!("{}/bulk-signups/{}/approve", BASE, alert.id))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json::<Value>();
    assert_eq!(body["status"], "approved");
    assert_eq!(body["summary"]["botsSuspended"], 6);
    assert_eq!(body["summary"]["ipBlocksCreated"], 3);

    let events = store.events().await;
    let approved = events
        .iter()
        .find(|e| e.event_type == "bulk_signup_approved")
        .unwrap();
    assert_eq!(approved.actor_id.as_deref(), Some("api-key:ops"));
}

#[tokio::test]
async fn test_ignore_requires_admin_and_is_single_use() {
    let (server, store) = setup().await;
    seed_cluster(&store).await;
    server
        .post(&format!("{}/bulk-signups/force-scan", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    let alert = store.alerts().await.remove(0);

    let res = server
        .post(&format!("{}/bulk-signups/{}/ignore", BASE, alert.id))
        .await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

    let res = server
        .post(&format!("{}/bulk-signups/{}/ignore", BASE, alert.id))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.json::<Value>()["status"], "ignored");

    let res = server
        .post(&format!("{}/bulk-signups/{}/ignore", BASE, alert.id))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert_eq!(res.json::<Value>()["message"], "Alert already ignored");

    let res = server
        .post(&format!("{}/bulk-signups/{}/ignore", BASE, Uuid::new_v4()))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pagination_offsets_are_bounded() {
    let (server, _) = setup().await;

    let res = server
        .get(&format!("{}/bulk-signups", BASE))
        .add_query_param("page", 2)
        .add_query_param("pageSize", 100)
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = res.json::<Value>();
    assert_eq!(body["page"], 2);
    assert_eq!(body["pageSize"], 100);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    for path in ["bulk-signups", "flagged-bots"] {
        let res = server
            .get(&format!("{}/{}", BASE, path))
            .add_query_param("page", i64::MAX)
            .add_query_param("pageSize", 100)
            .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json::<Value>()["error"], "VALIDATION_ERROR");
    }
}

#[tokio::test]
async fn test_malformed_alert_id_on_approval() {
    let (server, _) = setup().await;

    let res = server
        .post(&format!("{}/bulk-signups/not-a-uuid/approve", BASE))
        .add_header(header::AUTHORIZATION, bearer(ADMIN_KEY))
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>();
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().starts_with("Invalid alert id"));

    let res = server
        .get(&format!("{}/bulk-signups/not-a-uuid/approve", BASE))
        .add_query_param("token", "abc")
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    let page = res.text();
    assert!(page.contains("Approval failed"));
    assert!(page.contains("Invalid alert id"));
}
