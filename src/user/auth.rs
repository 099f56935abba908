use anyhow::{anyhow, bail, Result};
use rand::Rng;
use rand_distr::Alphanumeric;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

const SECRET_LENGTH: usize = 64;

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Opaque session token secret handed out at login.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionTokenValue(pub String);

impl SessionTokenValue {
    pub fn generate() -> Self {
        SessionTokenValue(random_secret())
    }
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    pub user_id: usize,
    pub value: SessionTokenValue,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
}

/// Bearer secret of an API key. Shown once at issue time; only the
/// stored copy is ever compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiKeyValue(pub String);

impl ApiKeyValue {
    pub fn generate() -> Self {
        ApiKeyValue(random_secret())
    }
}

#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: String,
    pub user_id: usize,
    pub name: String,
    pub value: ApiKeyValue,
    pub active: bool,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
}

mod argon2_hashing {
    use super::*;
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
    use argon2::Argon2;

    pub(super) fn generate_b64_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    pub(super) fn hash(plain: &str, b64_salt: &str) -> Result<String> {
        let salt =
            SaltString::from_b64(b64_salt).map_err(|e| anyhow!("Invalid password salt: {}", e))?;
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    pub(super) fn verify(plain: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Hashing scheme stored by name next to each password hash, so the
/// scheme can change without invalidating existing credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialHasher {
    Argon2,
}

impl CredentialHasher {
    pub fn generate_b64_salt(&self) -> String {
        match self {
            CredentialHasher::Argon2 => argon2_hashing::generate_b64_salt(),
        }
    }

    pub fn hash(&self, plain: &str, b64_salt: &str) -> Result<String> {
        match self {
            CredentialHasher::Argon2 => argon2_hashing::hash(plain, b64_salt),
        }
    }

    /// The salt is unused for argon2 (the PHC hash string embeds it) but
    /// stays in the signature so schemes that need it can be added.
    pub fn verify(&self, plain: &str, hash: &str, _b64_salt: &str) -> Result<bool> {
        match self {
            CredentialHasher::Argon2 => argon2_hashing::verify(plain, hash),
        }
    }
}

impl fmt::Display for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialHasher::Argon2 => write!(f, "argon2"),
        }
    }
}

impl FromStr for CredentialHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(CredentialHasher::Argon2),
            other => bail!("Unknown credential hasher: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordCredentials {
    pub user_id: usize,
    pub salt: String,
    pub hash: String,
    pub hasher: CredentialHasher,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_hash_and_verify() {
        let hasher = CredentialHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash("hunter2", &salt).unwrap();

        assert!(hasher.verify("hunter2", &hash, &salt).unwrap());
        assert!(!hasher.verify("hunter3", &hash, &salt).unwrap());
    }

    #[test]
    fn generated_secrets_are_long_and_distinct() {
        let a = SessionTokenValue::generate();
        let b = SessionTokenValue::generate();
        assert_eq!(a.0.len(), SECRET_LENGTH);
        assert_ne!(a, b);

        let key = ApiKeyValue::generate();
        assert_eq!(key.0.len(), SECRET_LENGTH);
        assert!(key.0.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hasher_name_roundtrip() {
        let hasher = CredentialHasher::Argon2;
        let parsed: CredentialHasher = hasher.to_string().parse().unwrap();
        assert_eq!(parsed, hasher);
    }

    #[test]
    fn unknown_hasher_name_is_rejected() {
        assert!("md5".parse::<CredentialHasher>().is_err());
    }
}
