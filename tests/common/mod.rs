//! Harness for the end-to-end suite: a real server on an ephemeral port
//! plus a cookie-holding HTTP client. Test files use only the re-exports
//! below; the typical opening is `TestServer::spawn().await` followed by
//! `TestClient::authenticated(server.base_url.clone()).await`.

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;
