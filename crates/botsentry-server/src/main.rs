//! BotSentry - bot email security service entry point

use anyhow::{Context, Result};
use botsentry_api::{create_router, AppState};
use botsentry_common::config::{Config, LoggingConfig};
use botsentry_core::{
    AnthropicClassifier, BulkSignupDetector, BulkSignupRemediation, BulkSignupScheduler, Clock,
    DailyReviewEngine, DailyReviewScheduler, SecurityMetrics, SmtpEmailSender, SystemClock,
    Templates,
};
use botsentry_storage::{DatabasePool, Repositories};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config.logging);
    info!(environment = %config.environment, "Starting BotSentry...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;
    info!("Database migrations completed");

    let repos = Repositories::postgres(db_pool.clone());
    let metrics = SecurityMetrics::new().context("Failed to register metrics")?;
    let templates = Arc::new(Templates::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sender = Arc::new(SmtpEmailSender::new(config.email.clone()));
    if config.email.smtp_host.is_none() {
        warn!("SMTP is not configured, notifications and admin reports will not be delivered");
    }
    if config.email.admin_recipients.is_empty() {
        warn!("No admin recipients configured");
    }

    let classifier = Arc::new(AnthropicClassifier::new(config.classifier.clone())?);
    if !classifier.is_configured() {
        warn!("Classifier API key missing, daily reviews will record classification failures");
    }

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
        clock.clone(),
        config.bulk_signup.ip_block_days,
        metrics.clone(),
    ));

    // Start the daily review scheduler
    let review_handle = if config.review.enabled {
        let scheduler = Arc::new(DailyReviewScheduler::new(
            engine.clone(),
            clock.clone(),
            config.review.clone(),
        ));
        Some(tokio::spawn(scheduler.run()))
    } else {
        info!("Daily review scheduler disabled");
        None
    };

    // Start the bulk signup scheduler
    let bulk_handle = if config.bulk_signup.enabled {
        let scheduler = Arc::new(BulkSignupScheduler::new(
            detector.clone(),
            config.bulk_signup.clone(),
        ));
        Some(tokio::spawn(scheduler.run()))
    } else {
        info!("Bulk signup scheduler disabled");
        None
    };

    let state = AppState {
        repos,
        engine,
        detector,
        remediation,
        templates,
        metrics,
        db_pool: Some(db_pool),
        admin_panel_url: config.links.admin_panel_url.clone(),
        docs_enabled: config.api.enable_docs,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    info!("Admin API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = review_handle {
        handle.abort();
    }
    if let Some(handle) = bulk_handle {
        handle.abort();
    }

    info!("BotSentry shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},botsentry=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
