use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: usize,
    pub handle: String,
    pub created: SystemTime,
}

/// Roles stored in the user database. Admin status is the existence of
/// an `Admin` role row; it is resolved on every check, never cached and
/// never denormalized onto other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Regular,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Regular => "Regular",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "regular" => Some(UserRole::Regular),
            _ => None,
        }
    }
}
