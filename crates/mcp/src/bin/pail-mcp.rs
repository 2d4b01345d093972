// Standalone MCP server binary

use anyhow::{Context, Result};
use clap::Parser;
use pail_core::{BackendKind, PailConfig};
use pail_mcp::server::McpServer;
use pail_mcp::tools::{register_storage_tools, ToolRegistry};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pail-mcp")]
#[command(about = "Object storage tools for MCP clients, served over stdio", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PAIL_CONFIG", default_value = "pail.toml")]
    config: PathBuf,

    /// Storage backend (s3 or local), overriding the configuration file
    #[arg(short, long, env = "PAIL_BACKEND")]
    backend: Option<BackendKind>,

    /// Directory served as buckets by the local backend
    #[arg(long, env = "PAIL_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// AWS region, overriding AWS_REGION and the configuration file
    #[arg(long)]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a .env file next to the working directory
    let dotenv = dotenvy::dotenv().ok();

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pail=info,pail_mcp=info,pail_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let args = Args::parse();

    tracing::info!("pail MCP server starting...");
    if let Some(path) = dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let mut config = PailConfig::load(&args.config).context("Failed to load configuration")?;
    if let Some(backend) = args.backend {
        config.storage.backend = backend;
    }
    if let Some(root) = args.local_root {
        config.storage.local.root = root;
    }
    if let Some(region) = args.region {
        config.storage.s3.region = region;
    }

    tracing::info!(backend = ?config.storage.backend, "Using storage backend");
    if config.storage.backend == BackendKind::S3 {
        tracing::debug!(s3 = ?config.storage.s3, "S3 settings");
    }

    // One backend handle, shared by every tool for the life of the process
    let backend = pail_core::connect(&config.storage)
        .await
        .context("Failed to initialize storage backend")?;

    let mut registry = ToolRegistry::new();
    register_storage_tools(&mut registry, backend);

    tracing::info!("Registered {} tools", registry.len());

    // Start MCP server
    let server = McpServer::new(registry);
    server.start().await?;

    Ok(())
}
