//! HTTP client for the bearer-key API surface.
//!
//! Every request carries the bridge's API key in the `Authorization`
//! header; the server decides what that key is allowed to do.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from the API surface, shaped for agent-facing diagnostics.
#[derive(Debug, Error)]
pub enum ApiClientError {
    /// The server answered with a non-success status.
    #[error("API Error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never completed or the body could not be decoded.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// HTTP client for communicating with the support-case API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API surface (e.g., "http://localhost:3001/api")
    /// * `api_key` - Bearer key sent with every request
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Issue a GET request against the API.
    pub async fn get(&self, path: &str) -> Result<Value, ApiClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Issue a POST request with a JSON body against the API.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<Value, ApiClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(ApiClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
