use super::error::{ApiError, AuthFailureReason};
use super::state::ServerState;
use crate::user::auth::SessionTokenValue;
use crate::user::UserRole;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

/// An authenticated browser session. The admin flag is resolved from the
/// role store on every extraction, never cached.
#[derive(Debug)]
pub struct Session {
    pub user_id: usize,
    pub token: String,
    pub is_admin: bool,
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

async fn extract_session_token_from_cookies(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Option<String> {
    CookieJar::from_request_parts(parts, ctx)
        .await
        .expect("Could not read cookies into CookieJar.")
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &mut Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_SESSION_TOKEN_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn resolve_session(ctx: &ServerState, token: String) -> Result<Session, ApiError> {
    let value = SessionTokenValue(token);
    let Some(session_token) = ctx.user_store.get_session_token(&value)? else {
        debug!("Session token not found in database");
        return Err(ApiError::NotAuthenticated(
            AuthFailureReason::InvalidCredential,
        ));
    };

    if let Err(e) = ctx.user_store.update_session_token_last_used(&value) {
        debug!("Failed to update session token last_used timestamp: {}", e);
        // Continue anyway, this is not critical for authentication
    }

    let is_admin = ctx
        .user_store
        .get_user_roles(session_token.user_id)?
        .contains(&UserRole::Admin);
    debug!(
        "Resolved session for user_id={} (is_admin={})",
        session_token.user_id, is_admin
    );

    Ok(Session {
        user_id: session_token.user_id,
        token: session_token.value.0,
        is_admin,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = match extract_session_token_from_cookies(parts, ctx)
            .await
            .or_else(|| extract_session_token_from_headers(parts))
        {
            Some(token) => token,
            None => {
                debug!("No session token in cookies nor headers");
                return Err(ApiError::NotAuthenticated(
                    AuthFailureReason::MissingCredential,
                ));
            }
        };
        resolve_session(ctx, token)
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token_from_cookies(parts, ctx)
            .await
            .or_else(|| extract_session_token_from_headers(parts));
        Ok(token.and_then(|token| resolve_session(ctx, token).ok()))
    }
}
