use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;
use tracing::{debug, info};

use super::api_key::{AdminApiKeyAuth, ApiKeyAuth};
use super::error::{ApiError, AuthFailureReason};
use super::session::Session;
use super::state::*;
#[cfg(feature = "slowdown")]
use super::slowdown_request;
use super::{log_requests, RequestsLoggingLevel, ServerConfig};
use crate::support::{policy, Actor, CaseMessage, CaseMessageView, CaseStatus, SupportCase};
use crate::support::SupportStore;
use crate::user::auth::SessionTokenValue;
use crate::user::{FullUserStore, UserManager, UserRole};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize)]
struct LoginBody {
    pub user_handle: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    pub user_id: usize,
    pub handle: String,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCaseBody {
    pub subject: String,
    pub initial_message: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct SetStatusBody {
    pub status: String,
}

impl From<&Session> for Actor {
    fn from(session: &Session) -> Self {
        Actor {
            user_id: session.user_id,
            is_admin: session.is_admin,
        }
    }
}

impl From<&ApiKeyAuth> for Actor {
    fn from(auth: &ApiKeyAuth) -> Self {
        Actor {
            user_id: auth.user_id,
            is_admin: auth.is_admin,
        }
    }
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

async fn login(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<LoginBody>,
) -> Result<Response, ApiError> {
    debug!("login() called for {}", body.user_handle);
    let mut locked_manager = user_manager.lock().unwrap();
    let Some(user_id) = locked_manager.verify_password(&body.user_handle, &body.password)? else {
        return Err(ApiError::NotAuthenticated(
            AuthFailureReason::InvalidCredential,
        ));
    };
    let token = locked_manager.generate_session_token(user_id)?;

    let response_body = serde_json::to_string(&LoginSuccessResponse {
        token: token.0.clone(),
    })
    .map_err(anyhow::Error::from)?;
    let cookie_value =
        HeaderValue::from_str(&format!("session_token={}; Path=/; HttpOnly", token.0))
            .map_err(anyhow::Error::from)?;
    Ok(response::Builder::new()
        .status(StatusCode::CREATED)
        .header(axum::http::header::SET_COOKIE, cookie_value)
        .body(Body::from(response_body))
        .map_err(anyhow::Error::from)?)
}

async fn logout(
    State(user_manager): State<GuardedUserManager>,
    session: Session,
) -> Result<Response, ApiError> {
    let mut locked_manager = user_manager.lock().unwrap();
    locked_manager
        .delete_session_token(session.user_id, &SessionTokenValue(session.token))
        .map_err(|_| ApiError::InvalidInput("Invalid session.".to_string()))?;

    let cookie_value = Cookie::build(Cookie::new("session_token", ""))
        .path("/")
        .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
        .same_site(SameSite::Lax)
        .build();

    Ok(response::Builder::new()
        .status(StatusCode::OK)
        .header(axum::http::header::SET_COOKIE, cookie_value.to_string())
        .body(Body::empty())
        .map_err(anyhow::Error::from)?)
}

async fn get_session(
    session: Session,
    State(user_store): State<GuardedUserStore>,
) -> Result<Json<SessionInfo>, ApiError> {
    let handle = user_store
        .get_user_handle(session.user_id)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(SessionInfo {
        user_id: session.user_id,
        handle,
        is_admin: session.is_admin,
    }))
}

fn create_case_for_user(
    support_store: &dyn SupportStore,
    user_id: usize,
    body: &CreateCaseBody,
) -> Result<SupportCase, ApiError> {
    let subject = body.subject.trim();
    let message = body.initial_message.trim();
    if subject.is_empty() {
        return Err(ApiError::InvalidInput("Subject cannot be empty".to_string()));
    }
    if message.is_empty() {
        return Err(ApiError::InvalidInput("Message cannot be empty".to_string()));
    }
    Ok(support_store.create_case_with_message(user_id, subject, message)?)
}

// Missing cases 404 before the access check.
fn load_case_for(
    actor: &Actor,
    support_store: &dyn SupportStore,
    case_id: usize,
) -> Result<SupportCase, ApiError> {
    let case = support_store.get_case(case_id)?.ok_or(ApiError::NotFound)?;
    if !policy::can_view_case(actor, &case) {
        return Err(ApiError::NotAuthorized);
    }
    Ok(case)
}

fn append_message(
    actor: &Actor,
    support_store: &dyn SupportStore,
    case_id: usize,
    message: &str,
) -> Result<CaseMessage, ApiError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ApiError::InvalidInput("Message cannot be empty".to_string()));
    }
    let case = support_store.get_case(case_id)?.ok_or(ApiError::NotFound)?;
    if !policy::can_post_message(actor, &case) {
        return Err(ApiError::NotAuthorized);
    }
    Ok(support_store.add_message(case_id, actor.user_id, message)?)
}

/// Attaches each author's admin status as it is now; a role change since
/// the message was written shows on the next read.
fn decorate_messages(
    user_store: &dyn FullUserStore,
    messages: Vec<CaseMessage>,
) -> Result<Vec<CaseMessageView>, ApiError> {
    messages
        .into_iter()
        .map(|message| {
            let is_admin = user_store
                .get_user_roles(message.user_id)?
                .contains(&UserRole::Admin);
            Ok(CaseMessageView { message, is_admin })
        })
        .collect()
}

async fn get_own_cases(
    session: Session,
    State(support_store): State<GuardedSupportStore>,
) -> Result<Json<Vec<SupportCase>>, ApiError> {
    Ok(Json(support_store.get_user_cases(session.user_id)?))
}

async fn create_case(
    session: Session,
    State(support_store): State<GuardedSupportStore>,
    Json(body): Json<CreateCaseBody>,
) -> Result<impl IntoResponse, ApiError> {
    let case = create_case_for_user(support_store.as_ref(), session.user_id, &body)?;
    Ok((StatusCode::CREATED, Json(case)))
}

async fn get_case(
    session: Session,
    State(support_store): State<GuardedSupportStore>,
    Path(case_id): Path<usize>,
) -> Result<Json<SupportCase>, ApiError> {
    let case = load_case_for(&Actor::from(&session), support_store.as_ref(), case_id)?;
    Ok(Json(case))
}

async fn get_case_messages(
    session: Session,
    State(state): State<ServerState>,
    Path(case_id): Path<usize>,
) -> Result<Json<Vec<CaseMessageView>>, ApiError> {
    load_case_for(&Actor::from(&session), state.support_store.as_ref(), case_id)?;
    let messages = state.support_store.get_case_messages(case_id)?;
    Ok(Json(decorate_messages(state.user_store.as_ref(), messages)?))
}

async fn post_case_message(
    session: Session,
    State(state): State<ServerState>,
    Path(case_id): Path<usize>,
    Json(body): Json<PostMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    let message = append_message(
        &Actor::from(&session),
        state.support_store.as_ref(),
        case_id,
        &body.message,
    )?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn put_case_status(
    session: Session,
    State(support_store): State<GuardedSupportStore>,
    Path(case_id): Path<usize>,
    Json(body): Json<SetStatusBody>,
) -> Result<Json<SupportCase>, ApiError> {
    if !session.is_admin {
        return Err(ApiError::NotAuthorized);
    }
    let status = CaseStatus::parse(&body.status)
        .ok_or_else(|| ApiError::InvalidInput(format!("Invalid status value: {}", body.status)))?;
    if !support_store.set_case_status(case_id, status)? {
        return Err(ApiError::NotFound);
    }
    let case = support_store.get_case(case_id)?.ok_or(ApiError::NotFound)?;
    Ok(Json(case))
}

async fn api_get_all_cases(
    AdminApiKeyAuth(_auth): AdminApiKeyAuth,
    State(support_store): State<GuardedSupportStore>,
) -> Result<Json<Vec<SupportCase>>, ApiError> {
    Ok(Json(support_store.get_all_cases()?))
}

async fn api_create_case(
    auth: ApiKeyAuth,
    State(support_store): State<GuardedSupportStore>,
    Json(body): Json<CreateCaseBody>,
) -> Result<impl IntoResponse, ApiError> {
    let case = create_case_for_user(support_store.as_ref(), auth.user_id, &body)?;
    Ok((StatusCode::CREATED, Json(case)))
}

async fn api_get_case_messages(
    auth: ApiKeyAuth,
    State(state): State<ServerState>,
    Path(case_id): Path<usize>,
) -> Result<Json<Vec<CaseMessageView>>, ApiError> {
    load_case_for(&Actor::from(&auth), state.support_store.as_ref(), case_id)?;
    let messages = state.support_store.get_case_messages(case_id)?;
    Ok(Json(decorate_messages(state.user_store.as_ref(), messages)?))
}

async fn api_post_case_message(
    auth: ApiKeyAuth,
    State(state): State<ServerState>,
    Path(case_id): Path<usize>,
    Json(body): Json<PostMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    let message = append_message(
        &Actor::from(&auth),
        state.support_store.as_ref(),
        case_id,
        &body.message,
    )?;
    Ok((StatusCode::CREATED, Json(message)))
}

impl ServerState {
    fn new(
        config: ServerConfig,
        user_store: Arc<dyn FullUserStore>,
        support_store: Arc<dyn SupportStore>,
        user_manager: UserManager,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            user_store,
            support_store,
            user_manager: Arc::new(Mutex::new(user_manager)),
            hash: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    user_store: Arc<dyn FullUserStore>,
    support_store: Arc<dyn SupportStore>,
) -> Result<Router> {
    let user_manager = UserManager::new(user_store.clone());
    let state = ServerState::new(config.clone(), user_store, support_store, user_manager);

    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/session", get(get_session))
        .with_state(state.clone());

    let support_routes: Router = Router::new()
        .route("/cases", get(get_own_cases))
        .route("/cases", post(create_case))
        .route("/cases/{id}", get(get_case))
        .route("/cases/{id}/messages", get(get_case_messages))
        .route("/cases/{id}/messages", post(post_case_message))
        .route("/cases/{id}/status", put(put_case_status))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/support-cases", get(api_get_all_cases))
        .route("/support-cases", post(api_create_case))
        .route("/support-cases/{id}/messages", get(api_get_case_messages))
        .route("/support-cases/{id}/messages", post(api_post_case_message))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let mut app: Router = home_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1/support", support_routes)
        .nest("/api", api_routes);

    #[cfg(feature = "slowdown")]
    {
        app = app.layer(middleware::from_fn(slowdown_request));
    }
    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    user_store: Arc<dyn FullUserStore>,
    support_store: Arc<dyn SupportStore>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    frontend_dir_path: Option<String>,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
        frontend_dir_path,
    };
    let app = make_app(config, user_store, support_store)?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::auth::{ApiKey, ApiKeyValue, PasswordCredentials, SessionToken, SessionTokenValue};
    use crate::user::{ApiKeyStore, CredentialsStore, SessionTokenStore, User, UserStore};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn stub_app() -> Router {
        make_app(
            ServerConfig::default(),
            Arc::new(InMemoryUserStore::default()),
            Arc::new(InMemorySupportStore::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn responds_unauthorized_on_protected_routes_without_credentials() {
        let app = stub_app();

        let protected_routes = vec![
            ("GET", "/v1/auth/logout"),
            ("GET", "/v1/auth/session"),
            ("GET", "/v1/support/cases"),
            ("POST", "/v1/support/cases"),
            ("GET", "/v1/support/cases/1"),
            ("GET", "/v1/support/cases/1/messages"),
            ("POST", "/v1/support/cases/1/messages"),
            ("PUT", "/v1/support/cases/1/status"),
            ("GET", "/api/support-cases"),
            ("POST", "/api/support-cases"),
            ("GET", "/api/support-cases/1/messages"),
            ("POST", "/api/support-cases/1/messages"),
        ];

        for (method, route) in protected_routes.into_iter() {
            println!("Trying route {} {}", method, route);
            let request = Request::builder()
                .method(method)
                .uri(route)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn malformed_bearer_headers_are_rejected_without_store_access() {
        // The stub stores panic on any call, so these only pass if the
        // header is rejected before a lookup happens.
        let app = stub_app();

        for auth_header in ["bearer lowercase", "Basic dXNlcjpwYXNz", "Bearer", "sk-123"] {
            let request = Request::builder()
                .uri("/api/support-cases")
                .header("Authorization", auth_header)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn home_reports_stats_without_a_session() {
        let app = stub_app();
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(3661)), "0d 01:01:01");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[derive(Default)]
    struct InMemoryUserStore {}

    impl UserStore for InMemoryUserStore {
        fn create_user(&self, _user_handle: &str) -> Result<usize> {
            todo!()
        }

        fn get_user(&self, _user_id: usize) -> Result<Option<User>> {
            todo!()
        }

        fn get_user_id(&self, _user_handle: &str) -> Result<Option<usize>> {
            todo!()
        }

        fn get_user_handle(&self, _user_id: usize) -> Result<Option<String>> {
            todo!()
        }

        fn get_all_user_handles(&self) -> Result<Vec<String>> {
            todo!()
        }

        fn get_user_roles(&self, _user_id: usize) -> Result<Vec<UserRole>> {
            todo!()
        }

        fn add_user_role(&self, _user_id: usize, _role: UserRole) -> Result<()> {
            todo!()
        }

        fn remove_user_role(&self, _user_id: usize, _role: UserRole) -> Result<()> {
            todo!()
        }
    }

    impl SessionTokenStore for InMemoryUserStore {
        fn get_session_token(&self, _value: &SessionTokenValue) -> Result<Option<SessionToken>> {
            todo!()
        }

        fn add_session_token(&self, _token: SessionToken) -> Result<()> {
            todo!()
        }

        fn delete_session_token(&self, _value: &SessionTokenValue) -> Result<Option<SessionToken>> {
            todo!()
        }

        fn update_session_token_last_used(&self, _value: &SessionTokenValue) -> Result<()> {
            todo!()
        }
    }

    impl CredentialsStore for InMemoryUserStore {
        fn get_password_credentials(&self, _user_id: usize) -> Result<Option<PasswordCredentials>> {
            todo!()
        }

        fn upsert_password_credentials(&self, _credentials: PasswordCredentials) -> Result<()> {
            todo!()
        }
    }

    impl ApiKeyStore for InMemoryUserStore {
        fn add_api_key(&self, _key: ApiKey) -> Result<()> {
            todo!()
        }

        fn get_api_key_by_value(&self, _value: &ApiKeyValue) -> Result<Option<ApiKey>> {
            todo!()
        }

        fn get_api_key(&self, _key_id: &str) -> Result<Option<ApiKey>> {
            todo!()
        }

        fn get_user_api_keys(&self, _user_id: usize) -> Result<Vec<ApiKey>> {
            todo!()
        }

        fn set_api_key_active(&self, _key_id: &str, _active: bool) -> Result<bool> {
            todo!()
        }

        fn update_api_key_last_used(&self, _key_id: &str) -> Result<()> {
            todo!()
        }
    }

    #[derive(Default)]
    struct InMemorySupportStore {}

    impl SupportStore for InMemorySupportStore {
        fn create_case_with_message(
            &self,
            _user_id: usize,
            _subject: &str,
            _message: &str,
        ) -> Result<SupportCase> {
            todo!()
        }

        fn get_case(&self, _case_id: usize) -> Result<Option<SupportCase>> {
            todo!()
        }

        fn get_user_cases(&self, _user_id: usize) -> Result<Vec<SupportCase>> {
            todo!()
        }

        fn get_all_cases(&self) -> Result<Vec<SupportCase>> {
            todo!()
        }

        fn add_message(
            &self,
            _case_id: usize,
            _user_id: usize,
            _message: &str,
        ) -> Result<CaseMessage> {
            todo!()
        }

        fn get_case_messages(&self, _case_id: usize) -> Result<Vec<CaseMessage>> {
            todo!()
        }

        fn set_case_status(&self, _case_id: usize, _status: CaseStatus) -> Result<bool> {
            todo!()
        }
    }
}
