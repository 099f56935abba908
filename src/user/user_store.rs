use anyhow::Result;

use super::auth::{ApiKey, ApiKeyValue, PasswordCredentials, SessionToken, SessionTokenValue};
use super::user_models::{User, UserRole};

pub trait UserStore {
    /// Creates a user and returns its id.
    /// Returns Err if the handle is already taken or on a database error.
    fn create_user(&self, user_handle: &str) -> Result<usize>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: usize) -> Result<Option<User>>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>>;

    fn get_all_user_handles(&self) -> Result<Vec<String>>;

    fn get_user_roles(&self, user_id: usize) -> Result<Vec<UserRole>>;

    /// Returns Err if the user already has the role.
    fn add_user_role(&self, user_id: usize, role: UserRole) -> Result<()>;

    fn remove_user_role(&self, user_id: usize, role: UserRole) -> Result<()>;
}

pub trait SessionTokenStore {
    /// Returns Ok(None) if the token does not exist.
    /// Returns Err if there is a database error.
    fn get_session_token(&self, value: &SessionTokenValue) -> Result<Option<SessionToken>>;

    fn add_session_token(&self, token: SessionToken) -> Result<()>;

    /// Deletes the token and returns it, or Ok(None) if it did not exist.
    fn delete_session_token(&self, value: &SessionTokenValue) -> Result<Option<SessionToken>>;

    fn update_session_token_last_used(&self, value: &SessionTokenValue) -> Result<()>;
}

pub trait CredentialsStore {
    /// Returns Ok(None) if the user has no password credentials.
    fn get_password_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>>;

    /// Inserts or replaces the user's password credentials.
    fn upsert_password_credentials(&self, credentials: PasswordCredentials) -> Result<()>;
}

pub trait ApiKeyStore {
    fn add_api_key(&self, key: ApiKey) -> Result<()>;

    /// Returns Ok(None) if no key has this secret. Deactivated keys are
    /// still returned; the caller decides what an inactive key means.
    fn get_api_key_by_value(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>>;

    /// Returns Ok(None) if the key id does not exist.
    fn get_api_key(&self, key_id: &str) -> Result<Option<ApiKey>>;

    fn get_user_api_keys(&self, user_id: usize) -> Result<Vec<ApiKey>>;

    /// Returns Ok(false) if the key id does not exist.
    fn set_api_key_active(&self, key_id: &str, active: bool) -> Result<bool>;

    fn update_api_key_last_used(&self, key_id: &str) -> Result<()>;
}

pub trait FullUserStore:
    UserStore + SessionTokenStore + CredentialsStore + ApiKeyStore + Send + Sync
{
}

impl<T: UserStore + SessionTokenStore + CredentialsStore + ApiKeyStore + Send + Sync> FullUserStore
    for T
{
}
