//! API routes

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use botsentry_core::bulk_signup::ADMIN_SECURITY_BASE;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth::{optional_admin, require_admin, AppState};
use crate::handlers::{bulk_signups, health, security};
use crate::openapi::create_openapi_routes;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);
    let docs_enabled = state.docs_enabled;

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    // Admin-only security routes
    let admin_routes = Router::new()
        .route("/stats", get(security::get_stats))
        .route("/reports", get(security::list_reports))
        .route("/reports/:date", get(security::get_report))
        .route("/flagged-bots", get(security::list_flagged_bots))
        .route("/flags/:bot_id", get(security::get_bot_flags))
        .route("/force-review", post(security::force_review))
        .route("/bulk-signups", get(bulk_signups::list_alerts))
        .route("/bulk-signups/force-scan", post(bulk_signups::force_scan))
        .route("/bulk-signups/:id", get(bulk_signups::get_alert))
        .route("/bulk-signups/:id/ignore", post(bulk_signups::ignore_alert))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Approval accepts either an admin key or the emailed token
    let approval_routes = Router::new()
        .route(
            "/bulk-signups/:id/approve",
            get(bulk_signups::approve_alert).post(bulk_signups::approve_alert),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_admin));

    let mut router = Router::new()
        .nest("/health", health_routes)
        .route("/metrics", get(health::metrics))
        .nest(ADMIN_SECURITY_BASE, admin_routes.merge(approval_routes))
        .with_state(state);

    if docs_enabled {
        router = router.merge(create_openapi_routes());
    }

    router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
