//! End-to-end tests for the bearer-key agent API surface
//!
//! Tests API key verification, the admin-only full listing, credential
//! failure reasons and case access rules on the /api routes.

mod common;

use common::{TestClient, TestServer, ADMIN_USER, OTHER_USER, TEST_USER};
use reqwest::StatusCode;

#[tokio::test]
async fn test_full_listing_requires_an_admin_key() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    client.create_case("Broken export", "CSV comes out empty").await;

    // A valid key held by a regular user is turned away with its own reason
    let user_key = server.issue_api_key(TEST_USER, "user-agent-key");
    let response = client.api_get_all_cases(&user_key.value.0).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "not_admin");

    // An admin key sees every case, not just its owner's
    let admin_key = server.issue_api_key(ADMIN_USER, "agent-key");
    let response = client.api_get_all_cases(&admin_key.value.0).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cases: serde_json::Value = response.json().await.unwrap();
    let cases = cases.as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["subject"], "Broken export");
}

#[tokio::test]
async fn test_unknown_and_inactive_keys_are_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    // A key that was never issued
    let response = client.api_get_all_cases("sk-this-was-never-issued").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "invalid_credential");

    // A real key stops working the moment it is revoked
    let key = server.issue_api_key(ADMIN_USER, "short-lived-key");
    let response = client.api_get_all_cases(&key.value.0).await;
    assert_eq!(response.status(), StatusCode::OK);

    server.revoke_api_key(&key.id);

    let response = client.api_get_all_cases(&key.value.0).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "invalid_credential");
}

#[tokio::test]
async fn test_missing_or_malformed_bearer_headers() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let key = server.issue_api_key(ADMIN_USER, "agent-key");

    // No Authorization header at all
    let response = client.api_get_all_cases_no_header().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "missing_credential");

    // Wrong scheme, wrong casing, or a bare secret: all rejected before
    // any lookup, with the same reason
    for header_value in [
        "Basic dXNlcjpwYXNz".to_string(),
        format!("bearer {}", key.value.0),
        key.value.0.clone(),
    ] {
        let response = client.api_get_all_cases_raw_header(&header_value).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["reason"], "missing_credential");
    }
}

#[tokio::test]
async fn test_agent_replies_are_attributed_to_the_key_owner() {
    let server = TestServer::spawn().await;
    let user_client = TestClient::authenticated(server.base_url.clone()).await;

    let response = user_client
        .create_case("Attachments fail", "Uploads stop at 99%")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let case: serde_json::Value = response.json().await.unwrap();
    let case_id = case["id"].as_u64().unwrap() as usize;

    let admin_key = server.issue_api_key(ADMIN_USER, "agent-key");
    let response = user_client
        .api_post_case_message(&admin_key.value.0, case_id, "Known issue, fix is rolling out")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let message: serde_json::Value = response.json().await.unwrap();
    assert_eq!(message["userId"], server.user_id(ADMIN_USER) as u64);

    // Read back through the session surface: the reply carries the admin flag
    let response = user_client.get_case_messages(case_id).await;
    let messages: serde_json::Value = response.json().await.unwrap();
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["message"], "Known issue, fix is rolling out");
    assert_eq!(messages[1]["isAdmin"], true);
}

#[tokio::test]
async fn test_api_case_creation_is_owned_by_the_key_owner() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let key = server.issue_api_key(TEST_USER, "user-agent-key");
    let response = client
        .api_create_case(&key.value.0, "Opened by an agent", "Filed on the user's behalf")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let case: serde_json::Value = response.json().await.unwrap();
    assert_eq!(case["userId"], server.user_id(TEST_USER) as u64);

    // The case shows up in the owner's session listing
    let response = client.get_own_cases().await;
    let cases: serde_json::Value = response.json().await.unwrap();
    let cases = cases.as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["subject"], "Opened by an agent");
}

#[tokio::test]
async fn test_api_messages_respect_case_access() {
    let server = TestServer::spawn().await;
    let user_client = TestClient::authenticated(server.base_url.clone()).await;

    let response = user_client
        .create_case("Dark mode glitch", "Buttons vanish on hover")
        .await;
    let case: serde_json::Value = response.json().await.unwrap();
    let case_id = case["id"].as_u64().unwrap() as usize;

    // A key owned by an unrelated user gets no access
    let other_key = server.issue_api_key(OTHER_USER, "other-agent-key");
    let response = user_client
        .api_get_case_messages(&other_key.value.0, case_id)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // An admin key reads the whole thread
    let admin_key = server.issue_api_key(ADMIN_USER, "agent-key");
    let response = user_client
        .api_get_case_messages(&admin_key.value.0, case_id)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let messages: serde_json::Value = response.json().await.unwrap();
    assert_eq!(messages.as_array().unwrap().len(), 1);

    // Missing cases are 404 on this surface too
    let response = user_client
        .api_get_case_messages(&admin_key.value.0, 99999)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resolved_rule_applies_on_the_bearer_path() {
    let server = TestServer::spawn().await;
    let user_client = TestClient::authenticated(server.base_url.clone()).await;
    let admin_client = TestClient::authenticated_admin(server.base_url.clone()).await;

    let response = user_client
        .create_case("Payment declined", "Card works everywhere else")
        .await;
    let case: serde_json::Value = response.json().await.unwrap();
    let case_id = case["id"].as_u64().unwrap() as usize;

    let response = admin_client.set_case_status(case_id, "resolved").await;
    assert_eq!(response.status(), StatusCode::OK);

    // The owner's own key cannot reply to a resolved case
    let user_key = server.issue_api_key(TEST_USER, "user-agent-key");
    let response = user_client
        .api_post_case_message(&user_key.value.0, case_id, "One more question")
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // An admin key can
    let admin_key = server.issue_api_key(ADMIN_USER, "agent-key");
    let response = user_client
        .api_post_case_message(&admin_key.value.0, case_id, "Reopening on our side")
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_key_usage_is_tracked() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let key = server.issue_api_key(ADMIN_USER, "agent-key");
    assert!(key.last_used.is_none());

    let response = client.api_get_all_cases(&key.value.0).await;
    assert_eq!(response.status(), StatusCode::OK);

    let keys = server
        .user_manager()
        .get_user_api_keys(server.user_id(ADMIN_USER))
        .expect("Failed to list API keys");
    let used = keys.iter().find(|k| k.id == key.id).unwrap();
    assert!(used.last_used.is_some());
}
