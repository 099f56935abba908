use super::error::{ApiError, AuthFailureReason};
use super::state::ServerState;
use crate::user::auth::ApiKeyValue;
use crate::user::UserRole;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

const BEARER_PREFIX: &str = "Bearer ";

/// A caller authenticated through an active API key.
#[derive(Debug)]
pub struct ApiKeyAuth {
    pub user_id: usize,
    pub key_id: String,
    pub is_admin: bool,
}

/// Same as [`ApiKeyAuth`] but additionally requires the admin role. A valid
/// key without the role is turned away with its own reason code.
#[derive(Debug)]
pub struct AdminApiKeyAuth(pub ApiKeyAuth);

/// Absent headers and headers without the exact `Bearer ` prefix are
/// rejected here, before any store lookup.
fn extract_bearer_token(parts: &Parts) -> Result<String, ApiError> {
    let missing = || ApiError::NotAuthenticated(AuthFailureReason::MissingCredential);
    let header = parts.headers.get("Authorization").ok_or_else(missing)?;
    let value = header.to_str().map_err(|_| missing())?;
    let token = value.strip_prefix(BEARER_PREFIX).ok_or_else(missing)?;
    Ok(token.to_string())
}

fn resolve_api_key(ctx: &ServerState, token: String) -> Result<ApiKeyAuth, ApiError> {
    let value = ApiKeyValue(token);
    let key = {
        let user_manager = ctx.user_manager.lock().unwrap();
        user_manager.verify_api_key(&value)?
    };
    let Some(key) = key else {
        // verify_api_key already logged whether the key was unknown or revoked.
        return Err(ApiError::NotAuthenticated(
            AuthFailureReason::InvalidCredential,
        ));
    };

    if let Err(e) = ctx.user_store.update_api_key_last_used(&key.id) {
        debug!("Failed to update API key last_used timestamp: {}", e);
        // Continue anyway, this is not critical for authentication
    }

    let is_admin = ctx
        .user_store
        .get_user_roles(key.user_id)?
        .contains(&UserRole::Admin);
    debug!(
        "Resolved API key {} for user_id={} (is_admin={})",
        key.id, key.user_id, is_admin
    );

    Ok(ApiKeyAuth {
        user_id: key.user_id,
        key_id: key.id,
        is_admin,
    })
}

impl FromRequestParts<ServerState> for ApiKeyAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        resolve_api_key(ctx, token)
    }
}

impl FromRequestParts<ServerState> for AdminApiKeyAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let auth = ApiKeyAuth::from_request_parts(parts, ctx).await?;
        if !auth.is_admin {
            debug!("API key {} belongs to a non-admin user", auth.key_id);
            return Err(ApiError::NotAuthenticated(AuthFailureReason::NotAdmin));
        }
        Ok(AdminApiKeyAuth(auth))
    }
}
