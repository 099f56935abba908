use axum::extract::FromRef;

use crate::support::SupportStore;
use crate::user::{FullUserStore, UserManager};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::ServerConfig;

/// Read paths go straight to the stores; mutations go through the
/// manager, which holds the hashing and key-generation logic.
pub type GuardedUserStore = Arc<dyn FullUserStore>;
pub type GuardedSupportStore = Arc<dyn SupportStore>;
pub type GuardedUserManager = Arc<Mutex<UserManager>>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub user_store: GuardedUserStore,
    pub support_store: GuardedSupportStore,
    pub user_manager: GuardedUserManager,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedUserStore {
    fn from_ref(input: &ServerState) -> Self {
        input.user_store.clone()
    }
}

impl FromRef<ServerState> for GuardedSupportStore {
    fn from_ref(input: &ServerState) -> Self {
        input.support_store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
