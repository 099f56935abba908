//! Test server lifecycle management
//!
//! Spawns one fully wired server per test, backed by throwaway SQLite
//! files, and tears it down when the `TestServer` drops.

use super::constants::*;
use super::fixtures::create_test_db_with_users;
use std::sync::Arc;
use std::time::Duration;
use supportdesk_server::server::{server::make_app, RequestsLoggingLevel, ServerConfig};
use supportdesk_server::support::{SqliteSupportStore, SupportStore};
use supportdesk_server::user::auth::ApiKey;
use supportdesk_server::user::{FullUserStore, SqliteUserStore, UserManager};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub struct TestServer {
    /// Where the spawned server listens, e.g. "http://127.0.0.1:41234".
    pub base_url: String,

    user_store: Arc<dyn FullUserStore>,

    // Dropping the TempDir deletes the databases, so it lives here.
    _db_dir: TempDir,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Seeds the user database, opens an empty support database next to
    /// it, binds an ephemeral port and serves in a background task.
    /// Returns once the home endpoint answers; panics if any of that
    /// fails, since no test can proceed without a server.
    pub async fn spawn() -> Self {
        let (db_dir, user_db_path) =
            create_test_db_with_users().expect("Failed to create test database");

        let user_store: Arc<dyn FullUserStore> =
            Arc::new(SqliteUserStore::new(&user_db_path).expect("Failed to open user store"));

        let support_store: Arc<dyn SupportStore> = Arc::new(
            SqliteSupportStore::new(db_dir.path().join("support.db"))
                .expect("Failed to open support store"),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("Failed to get local address").port();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            frontend_dir_path: None,
        };
        let app =
            make_app(config, user_store.clone(), support_store).expect("Failed to build app");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            user_store,
            _db_dir: db_dir,
            shutdown: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// A user manager over the same backing store the server uses.
    pub fn user_manager(&self) -> UserManager {
        UserManager::new(self.user_store.clone())
    }

    /// Looks up a user id by handle, panicking if the user does not exist.
    pub fn user_id(&self, user_handle: &str) -> usize {
        self.user_manager()
            .get_user_id(user_handle)
            .expect("Failed to look up user")
            .unwrap_or_else(|| panic!("User '{}' not found", user_handle))
    }

    /// Issues an API key for the given user; the returned key carries its secret.
    pub fn issue_api_key(&self, user_handle: &str, name: &str) -> ApiKey {
        let user_id = self.user_id(user_handle);
        self.user_manager()
            .issue_api_key(user_id, name)
            .expect("Failed to issue API key")
    }

    /// Deactivates an API key by id.
    pub fn revoke_api_key(&self, key_id: &str) {
        self.user_manager()
            .revoke_api_key(key_id)
            .expect("Failed to revoke API key");
    }

    /// Grants the admin role to an existing user.
    pub fn grant_admin(&self, user_handle: &str) {
        let user_id = self.user_id(user_handle);
        self.user_manager()
            .grant_admin(user_id)
            .expect("Failed to grant admin");
    }

    async fn wait_for_ready(&self) {
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let deadline =
            std::time::Instant::now() + Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        while std::time::Instant::now() < deadline {
            if let Ok(response) = probe.get(format!("{}/", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
        panic!(
            "Server did not become ready within {}ms",
            SERVER_READY_TIMEOUT_MS
        );
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
