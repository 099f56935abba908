//! Test fixture creation for the user database
//!
//! Support cases are deliberately not seeded here; the e2e suites create
//! them through the API so the flows under test build their own data.

use super::constants::*;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use supportdesk_server::user::{FullUserStore, SqliteUserStore, UserManager};
use tempfile::TempDir;

/// Creates a temporary user database with three users: a regular user,
/// a second regular user and an admin.
/// Returns (temp_dir, user_db_path).
pub fn create_test_db_with_users() -> Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("users.db");

    {
        let store: Arc<dyn FullUserStore> = Arc::new(SqliteUserStore::new(&db_path)?);
        let mut manager = UserManager::new(store);

        let user_id = create_user_with_password(&mut manager, TEST_USER, TEST_PASS, false)?;
        eprintln!("Created test user {} with id {}", TEST_USER, user_id);

        let other_id = create_user_with_password(&mut manager, OTHER_USER, OTHER_PASS, false)?;
        eprintln!("Created test user {} with id {}", OTHER_USER, other_id);

        let admin_id = create_user_with_password(&mut manager, ADMIN_USER, ADMIN_PASS, true)?;
        eprintln!("Created admin user {} with id {}", ADMIN_USER, admin_id);
    }

    Ok((temp_dir, db_path))
}

/// Creates a user with the given credentials, optionally granting admin
pub fn create_user_with_password(
    manager: &mut UserManager,
    handle: &str,
    password: &str,
    admin: bool,
) -> Result<usize> {
    let user_id = manager.add_user(handle)?;
    manager.set_password(user_id, password)?;
    if admin {
        manager.grant_admin(user_id)?;
    }
    Ok(user_id)
}
