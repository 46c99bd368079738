//! Relay MCP Server
//!
//! Context-augmented streaming completion for AI agents via MCP.
//!
//! ## Tools
//!
//! - `index` - Index a project directory for semantic retrieval
//! - `search_context` - Ranked context retrieval for a query
//! - `stream_complete` - Streaming completion augmented with retrieved context
//! - `status` - Store, circuit breaker, and session health
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "relay": {
//!       "command": "relay-mcp"
//!     }
//!   }
//! }
//! ```

use anyhow::Result;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::path::PathBuf;

mod config;
mod tools;

use config::RelayConfig;
use tools::RelayService;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure logging to stderr only (stdout is for MCP protocol)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting Relay MCP server");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RELAY_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("relay.toml"));
    let config = RelayConfig::load(Some(&config_path))?;

    let metrics_bind = config.metrics_bind.clone();
    let service = RelayService::new(config)?;

    let mut exporter_handle = None;
    if let Some(bind) = metrics_bind {
        exporter_handle =
            Some(relay_metrics::serve_metrics(&bind, service.metrics().registry()).await?);
    }

    // Create and start the MCP server
    let server = service.serve(stdio()).await?;

    // Wait for shutdown
    server.waiting().await?;

    if let Some(handle) = exporter_handle {
        handle.abort();
    }

    log::info!("Relay MCP server stopped");
    Ok(())
}
