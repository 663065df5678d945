//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use botsentry_core::{BulkSignupDetector, BulkSignupRemediation, DailyReviewEngine, SecurityMetrics, Templates};
use botsentry_storage::models::AdminApiKey;
use botsentry_storage::{DatabasePool, Repositories};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Scope required for the admin security API
pub const ADMIN_SECURITY_SCOPE: &str = "admin:security";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub engine: Arc<DailyReviewEngine>,
    pub detector: Arc<BulkSignupDetector>,
    pub remediation: Arc<BulkSignupRemediation>,
    pub templates: Arc<Templates>,
    pub metrics: SecurityMetrics,
    /// Checked by the readiness probe when present
    pub db_pool: Option<DatabasePool>,
    pub admin_panel_url: String,
    pub docs_enabled: bool,
}

/// Authenticated context extracted from an admin API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,
    pub api_key_name: String,
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Check if the authenticated context has a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }

    /// Name recorded as the actor of security events
    pub fn actor(&self) -> String {
        format!("api-key:{}", self.api_key_name)
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key.trim());
            }
        }
    }

    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    api_key.get(..8)
}

/// Hash an API key for comparison
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

/// Verify an API key against a stored hash.
///
/// Supports Argon2 hashes (`$argon2...`) and SHA-256 hex hashes.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the key store
async fn validate_api_key(state: &AppState, api_key: &str) -> Result<AdminApiKey, ApiError> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        ApiError::unauthorized("Invalid API key")
    })?;

    let candidates = state.repos.api_keys.find_by_prefix(prefix).await.map_err(|e| {
        error!("Failed to look up API key: {}", e);
        ApiError::internal("Internal server error")
    })?;

    for candidate in candidates {
        if !verify_api_key(api_key, &candidate.key_hash) {
            continue;
        }
        if candidate.is_expired() {
            warn!("API key {} has expired", candidate.id);
            return Err(ApiError::unauthorized("API key expired"));
        }

        let keys = state.repos.api_keys.clone();
        let key_id = candidate.id;
        tokio::spawn(async move {
            if let Err(e) = keys.update_last_used(key_id).await {
                error!("Failed to update API key last_used_at: {}", e);
            }
        });

        debug!("API key {} authenticated", candidate.id);
        return Ok(candidate);
    }

    warn!("No matching API key for prefix: {}", prefix);
    Err(ApiError::unauthorized("Invalid API key"))
}

async fn authenticate(state: &AppState, api_key: &str) -> Result<AuthContext, ApiError> {
    let key = validate_api_key(state, api_key).await?;
    let ctx = AuthContext {
        api_key_id: key.id,
        api_key_name: key.name.clone(),
        scopes: key.scopes_vec(),
    };
    require_scope(&ctx, ADMIN_SECURITY_SCOPE)?;
    Ok(ctx)
}

/// Require an admin API key with the security scope
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        ApiError::unauthorized("Missing API key")
    })?;

    let ctx = authenticate(&state, api_key).await?;
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}

/// Attach an [`AuthContext`] when a key is supplied; anonymous requests pass through
pub async fn optional_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(api_key) = extract_api_key(&request) {
        let ctx = authenticate(&state, api_key).await?;
        request.extensions_mut().insert(ctx);
    }
    Ok(next.run(request).await)
}

/// Check if the authenticated key has a specific scope
pub fn require_scope(auth_context: &AuthContext, scope: &str) -> Result<(), ApiError> {
    if !auth_context.has_scope(scope) {
        warn!(
            "Scope access denied: API key {} lacks scope '{}'",
            auth_context.api_key_id, scope
        );
        return Err(ApiError::forbidden(format!("Missing scope '{}'", scope)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    #[test]
    fn verifies_sha256_hash() {
        let api_key = "bsk_test_sha_key";
        let hash = hash_api_key(api_key);

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn verifies_argon2_hash() {
        let api_key = "bsk_test_argon2_key";
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(api_key.as_bytes(), &salt)
            .expect("argon2 hash generation should succeed")
            .to_string();

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn wildcard_scope_grants_everything() {
        let ctx = AuthContext {
            api_key_id: Uuid::new_v4(),
            api_key_name: "ops".to_string(),
            scopes: vec!["*".to_string()],
        };
        assert!(ctx.has_scope(ADMIN_SECURITY_SCOPE));
        assert_eq!(ctx.actor(), "api-key:ops");

        let narrow = AuthContext {
            scopes: vec!["read".to_string()],
            ..ctx
        };
        assert!(require_scope(&narrow, ADMIN_SECURITY_SCOPE).is_err());
    }

    #[test]
    fn short_keys_have_no_prefix() {
        assert_eq!(extract_key_prefix("short"), None);
        assert_eq!(extract_key_prefix("bsk_live_abcdef"), Some("bsk_live"));
    }
}
