use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;
use uuid::Uuid;

use super::auth::{
    ApiKey, ApiKeyValue, CredentialHasher, PasswordCredentials, SessionToken, SessionTokenValue,
};
use super::user_models::{User, UserRole};
use super::user_store::FullUserStore;

pub struct UserManager {
    user_store: Arc<dyn FullUserStore>,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn FullUserStore>) -> Self {
        Self { user_store }
    }

    pub fn add_user<T: AsRef<str>>(&mut self, user_handle: T) -> Result<usize> {
        let user_handle = user_handle.as_ref().trim();
        if user_handle.is_empty() {
            bail!("The user handle cannot be empty.")
        }
        if self.user_store.get_user_id(user_handle)?.is_some() {
            bail!("User handle already exists.");
        }
        self.user_store.create_user(user_handle)
    }

    pub fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        self.user_store.get_user(user_id)
    }

    pub fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        self.user_store.get_user_id(user_handle)
    }

    pub fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        self.user_store.get_user_handle(user_id)
    }

    pub fn get_all_user_handles(&self) -> Result<Vec<String>> {
        self.user_store.get_all_user_handles()
    }

    pub fn is_admin(&self, user_id: usize) -> Result<bool> {
        Ok(self
            .user_store
            .get_user_roles(user_id)?
            .contains(&UserRole::Admin))
    }

    pub fn grant_admin(&mut self, user_id: usize) -> Result<()> {
        if self.is_admin(user_id)? {
            bail!("User is already an admin.");
        }
        self.user_store.add_user_role(user_id, UserRole::Admin)
    }

    pub fn revoke_admin(&mut self, user_id: usize) -> Result<()> {
        if !self.is_admin(user_id)? {
            bail!("User is not an admin.");
        }
        self.user_store.remove_user_role(user_id, UserRole::Admin)
    }

    pub fn set_password(&mut self, user_id: usize, password: &str) -> Result<()> {
        if password.is_empty() {
            bail!("The password cannot be empty.")
        }
        if self.user_store.get_user_handle(user_id)?.is_none() {
            bail!("No such user.");
        }
        let hasher = CredentialHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password, &salt)?;
        self.user_store.upsert_password_credentials(PasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_used: None,
        })
    }

    /// Checks a handle and password pair. Returns `Ok(None)` when the handle is
    /// unknown, the user has no password set, or the password does not match.
    pub fn verify_password(&self, user_handle: &str, password: &str) -> Result<Option<usize>> {
        let Some(user_id) = self.user_store.get_user_id(user_handle)? else {
            debug!("Login attempt for unknown handle {}", user_handle);
            return Ok(None);
        };
        let Some(credentials) = self.user_store.get_password_credentials(user_id)? else {
            debug!("User {} has no password credentials", user_id);
            return Ok(None);
        };
        if credentials
            .hasher
            .verify(password, &credentials.hash, &credentials.salt)?
        {
            Ok(Some(user_id))
        } else {
            debug!("Password verification failed for user {}", user_id);
            Ok(None)
        }
    }

    pub fn generate_session_token(&mut self, user_id: usize) -> Result<SessionTokenValue> {
        let token = SessionToken {
            user_id,
            value: SessionTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        let value = token.value.clone();
        self.user_store.add_session_token(token)?;
        Ok(value)
    }

    pub fn delete_session_token(
        &mut self,
        user_id: usize,
        value: &SessionTokenValue,
    ) -> Result<()> {
        match self.user_store.delete_session_token(value)? {
            Some(removed) if removed.user_id == user_id => Ok(()),
            Some(removed) => {
                let owner = removed.user_id;
                let _ = self.user_store.add_session_token(removed);
                bail!(
                    "Tried to delete session token of user {}, but it belongs to user {}.",
                    user_id,
                    owner
                )
            }
            None => bail!("Session token not found."),
        }
    }

    pub fn issue_api_key(&mut self, user_id: usize, name: &str) -> Result<ApiKey> {
        let name = name.trim();
        if name.is_empty() {
            bail!("The API key name cannot be empty.")
        }
        let handle = self
            .user_store
            .get_user_handle(user_id)?
            .with_context(|| format!("User {} not found.", user_id))?;
        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            user_id,
            name: name.to_string(),
            value: ApiKeyValue::generate(),
            active: true,
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_api_key(key.clone())?;
        debug!("Issued API key {} ({}) for user {}", key.id, name, handle);
        Ok(key)
    }

    pub fn revoke_api_key(&mut self, key_id: &str) -> Result<()> {
        if !self.user_store.set_api_key_active(key_id, false)? {
            bail!("API key not found.");
        }
        Ok(())
    }

    pub fn get_user_api_keys(&self, user_id: usize) -> Result<Vec<ApiKey>> {
        self.user_store.get_user_api_keys(user_id)
    }

    /// Resolves an API key secret to the key it belongs to. Returns `Ok(None)`
    /// when no key carries that secret or the matching key has been revoked.
    pub fn verify_api_key(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>> {
        let Some(key) = self.user_store.get_api_key_by_value(value)? else {
            debug!("API key not found");
            return Ok(None);
        };
        if !key.active {
            debug!("API key {} is revoked", key.id);
            return Ok(None);
        }
        Ok(Some(key))
    }
}
