use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod sqlite_persistence;

mod support;
use support::{SqliteSupportStore, SupportStore};

mod user;
use user::{SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite database files (users.db, support.db).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a user with the given handle.
    AddUser { user_handle: String },

    /// Sets (or replaces) the password of a user.
    SetPassword {
        user_handle: String,
        password: String,
    },

    /// Grants the admin role to a user.
    GrantAdmin { user_handle: String },

    /// Revokes the admin role from a user.
    RevokeAdmin { user_handle: String },

    /// Issues a new API key for a user and prints its secret.
    /// The secret is shown only this once.
    IssueKey { user_handle: String, name: String },

    /// Deactivates an API key by id.
    RevokeKey { key_id: String },

    /// Shows all API keys of a user (without their secrets).
    ListKeys { user_handle: String },

    /// Shows all user handles.
    ListUsers,

    /// Creates a demo dataset: a regular user, an admin user with an
    /// API key, and one example support case.
    Seed,
}

fn require_user_id(user_manager: &UserManager, user_handle: &str) -> Result<usize> {
    user_manager
        .get_user_id(user_handle)?
        .with_context(|| format!("User '{}' not found", user_handle))
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    std::fs::create_dir_all(&cli_args.db_dir)
        .with_context(|| format!("Could not create db dir {:?}", cli_args.db_dir))?;

    let user_store = Arc::new(SqliteUserStore::new(cli_args.db_dir.join("users.db"))?);
    let mut user_manager = UserManager::new(user_store);

    match cli_args.command {
        Command::AddUser { user_handle } => {
            let user_id = user_manager.add_user(&user_handle)?;
            println!("Created user '{}' with id {}", user_handle, user_id);
        }
        Command::SetPassword {
            user_handle,
            password,
        } => {
            let user_id = require_user_id(&user_manager, &user_handle)?;
            user_manager.set_password(user_id, &password)?;
            println!("Password updated for user '{}'", user_handle);
        }
        Command::GrantAdmin { user_handle } => {
            let user_id = require_user_id(&user_manager, &user_handle)?;
            user_manager.grant_admin(user_id)?;
            println!("User '{}' is now an admin", user_handle);
        }
        Command::RevokeAdmin { user_handle } => {
            let user_id = require_user_id(&user_manager, &user_handle)?;
            user_manager.revoke_admin(user_id)?;
            println!("User '{}' is no longer an admin", user_handle);
        }
        Command::IssueKey { user_handle, name } => {
            let user_id = require_user_id(&user_manager, &user_handle)?;
            let key = user_manager.issue_api_key(user_id, &name)?;
            println!("Issued API key '{}' for user '{}'", key.name, user_handle);
            println!("Key id: {}", key.id);
            println!("Secret (shown only this once): {}", key.value.0);
        }
        Command::RevokeKey { key_id } => {
            user_manager.revoke_api_key(&key_id)?;
            println!("API key {} deactivated", key_id);
        }
        Command::ListKeys { user_handle } => {
            let user_id = require_user_id(&user_manager, &user_handle)?;
            let keys = user_manager.get_user_api_keys(user_id)?;
            if keys.is_empty() {
                println!("(no API keys)");
            }
            for key in keys {
                println!("- {} ('{}') active={}", key.id, key.name, key.active);
            }
        }
        Command::ListUsers => {
            for handle in user_manager.get_all_user_handles()? {
                println!("{}", handle);
            }
        }
        Command::Seed => {
            let support_store = SqliteSupportStore::new(cli_args.db_dir.join("support.db"))?;

            let demo_id = user_manager.add_user("demo")?;
            user_manager.set_password(demo_id, "demo1234")?;

            let support_id = user_manager.add_user("support")?;
            user_manager.set_password(support_id, "support1234")?;
            user_manager.grant_admin(support_id)?;
            let key = user_manager.issue_api_key(support_id, "seeded-agent-key")?;

            let case = support_store.create_case_with_message(
                demo_id,
                "Cannot log in on mobile",
                "The app rejects my password since this morning.",
            )?;

            println!("Seeded user 'demo' (password: demo1234)");
            println!("Seeded admin 'support' (password: support1234)");
            println!("Support case #{}: {}", case.id, case.subject);
            println!("Agent API key (shown only this once): {}", key.value.0);
        }
    }

    Ok(())
}
