pub mod api_key;
pub mod config;
pub mod error;
mod http_layers;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};
