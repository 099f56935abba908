//! SupportDesk Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod mcp;
pub mod server;
pub mod sqlite_persistence;
pub mod support;
pub mod user;

// Re-export commonly used types for convenience
pub use server::{run_server, RequestsLoggingLevel};
pub use support::{SqliteSupportStore, SupportStore};
pub use user::{SqliteUserStore, UserManager, UserRole, UserStore};
