use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod mcp;

use mcp::client::ApiClient;
use mcp::registry::McpRegistry;
use mcp::tools::register_all_tools;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Bearer API key used to authenticate against the support-case API.
    pub api_key: String,

    /// Base URL of the bearer-key API surface.
    #[clap(long, default_value = "http://localhost:3001/api")]
    pub base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Stdout carries the protocol stream, so logs go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let mut registry = McpRegistry::new();
    register_all_tools(&mut registry);

    info!("Forwarding tool calls to {}", cli_args.base_url);
    let client = ApiClient::new(cli_args.base_url, cli_args.api_key);

    mcp::stdio::run(registry, client).await
}
