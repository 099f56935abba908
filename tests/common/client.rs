//! HTTP client for end-to-end tests
//!
//! One method per server endpoint, so a route change touches this file
//! and nothing else. Session cookies are handled by the underlying
//! reqwest cookie store; the bearer-key methods bypass it.

use super::constants::*;
use reqwest::{RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
}

impl TestClient {
    /// Fresh client with no session. Start here when the test exercises
    /// the login flow itself.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Client already logged in as the seeded regular user.
    pub async fn authenticated(base_url: String) -> Self {
        Self::logged_in(base_url, TEST_USER, TEST_PASS).await
    }

    /// Client already logged in as the seeded admin.
    pub async fn authenticated_admin(base_url: String) -> Self {
        Self::logged_in(base_url, ADMIN_USER, ADMIN_PASS).await
    }

    /// Client already logged in as the second regular user.
    pub async fn authenticated_other(base_url: String) -> Self {
        Self::logged_in(base_url, OTHER_USER, OTHER_PASS).await
    }

    /// Panics on login failure; a broken fixture login means the whole
    /// suite is meaningless.
    async fn logged_in(base_url: String, handle: &str, password: &str) -> Self {
        let client = Self::new(base_url);
        let response = client.login(handle, password).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "login as {} failed: {:?}",
            handle,
            response.text().await
        );
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(builder: RequestBuilder) -> Response {
        builder.send().await.expect("Failed to send request")
    }

    // Home endpoint.

    /// GET /
    pub async fn home(&self) -> Response {
        Self::send(self.client.get(self.url("/"))).await
    }

    // Authentication endpoints.

    /// POST /v1/auth/login
    pub async fn login(&self, handle: &str, password: &str) -> Response {
        let body = json!({
            "user_handle": handle,
            "password": password,
        });
        Self::send(self.client.post(self.url("/v1/auth/login")).json(&body)).await
    }

    /// GET /v1/auth/logout
    pub async fn logout(&self) -> Response {
        Self::send(self.client.get(self.url("/v1/auth/logout"))).await
    }

    /// GET /v1/auth/session
    pub async fn get_session(&self) -> Response {
        Self::send(self.client.get(self.url("/v1/auth/session"))).await
    }

    /// GET /v1/auth/session with a raw session token in the Authorization
    /// header, exercising the header fallback of the session extractor
    /// without involving this client's cookie store.
    pub async fn get_session_with_token(&self, token: &str) -> Response {
        let req = self
            .client
            .get(self.url("/v1/auth/session"))
            .header("Authorization", token);
        Self::send(req).await
    }

    // Support case endpoints (session cookie).

    /// GET /v1/support/cases
    pub async fn get_own_cases(&self) -> Response {
        Self::send(self.client.get(self.url("/v1/support/cases"))).await
    }

    /// POST /v1/support/cases
    pub async fn create_case(&self, subject: &str, initial_message: &str) -> Response {
        let body = json!({
            "subject": subject,
            "initialMessage": initial_message,
        });
        Self::send(self.client.post(self.url("/v1/support/cases")).json(&body)).await
    }

    /// GET /v1/support/cases/{id}
    pub async fn get_case(&self, case_id: usize) -> Response {
        let url = self.url(&format!("/v1/support/cases/{}", case_id));
        Self::send(self.client.get(url)).await
    }

    /// GET /v1/support/cases/{id}/messages
    pub async fn get_case_messages(&self, case_id: usize) -> Response {
        let url = self.url(&format!("/v1/support/cases/{}/messages", case_id));
        Self::send(self.client.get(url)).await
    }

    /// POST /v1/support/cases/{id}/messages
    pub async fn post_case_message(&self, case_id: usize, message: &str) -> Response {
        let url = self.url(&format!("/v1/support/cases/{}/messages", case_id));
        Self::send(self.client.post(url).json(&json!({ "message": message }))).await
    }

    /// PUT /v1/support/cases/{id}/status
    pub async fn set_case_status(&self, case_id: usize, status: &str) -> Response {
        let url = self.url(&format!("/v1/support/cases/{}/status", case_id));
        Self::send(self.client.put(url).json(&json!({ "status": status }))).await
    }

    // Agent API endpoints (bearer key).

    /// GET /api/support-cases with a bearer API key
    pub async fn api_get_all_cases(&self, api_key: &str) -> Response {
        let req = self
            .client
            .get(self.url("/api/support-cases"))
            .bearer_auth(api_key);
        Self::send(req).await
    }

    /// GET /api/support-cases with an arbitrary Authorization header value
    pub async fn api_get_all_cases_raw_header(&self, header_value: &str) -> Response {
        let req = self
            .client
            .get(self.url("/api/support-cases"))
            .header("Authorization", header_value);
        Self::send(req).await
    }

    /// GET /api/support-cases without any Authorization header
    pub async fn api_get_all_cases_no_header(&self) -> Response {
        Self::send(self.client.get(self.url("/api/support-cases"))).await
    }

    /// POST /api/support-cases with a bearer API key
    pub async fn api_create_case(
        &self,
        api_key: &str,
        subject: &str,
        initial_message: &str,
    ) -> Response {
        let body = json!({
            "subject": subject,
            "initialMessage": initial_message,
        });
        let req = self
            .client
            .post(self.url("/api/support-cases"))
            .bearer_auth(api_key)
            .json(&body);
        Self::send(req).await
    }

    /// GET /api/support-cases/{id}/messages with a bearer API key
    pub async fn api_get_case_messages(&self, api_key: &str, case_id: usize) -> Response {
        let url = self.url(&format!("/api/support-cases/{}/messages", case_id));
        Self::send(self.client.get(url).bearer_auth(api_key)).await
    }

    /// POST /api/support-cases/{id}/messages with a bearer API key
    pub async fn api_post_case_message(
        &self,
        api_key: &str,
        case_id: usize,
        message: &str,
    ) -> Response {
        let url = self.url(&format!("/api/support-cases/{}/messages", case_id));
        let req = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({ "message": message }));
        Self::send(req).await
    }
}
