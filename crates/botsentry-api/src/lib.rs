//! BotSentry API - admin REST API
//!
//! This crate provides the admin security API: review stats and reports,
//! flagged bots, forced runs, and the bulk signup alert workflow.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use error::ApiError;
pub use openapi::create_openapi_routes;
pub use routes::create_router;
