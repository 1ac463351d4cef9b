//! Equity Analytics API Server Binary
//!
//! Run with: `cargo run --bin equity-analytics-server`
//!
//! Reads `config.yaml` (or the file named by `CONFIG_PATH`); `HOST` and `PORT`
//! override the server section.

use anyhow::Context;
use equity_analytics::{run_server, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is initialized in run_server(); RUST_LOG controls the level.
    let config = AppConfig::load().context("failed to load configuration")?;

    println!("Starting Equity Analytics API Server...");
    println!("   Address:  http://{}", config.server.address());
    println!("   Database: {}", config.db_path.display());
    println!("   Exchange: {}", config.exchange_timezone);
    println!();
    println!("Available endpoints:");
    println!("  GET  /health             - Health check");
    println!("  POST /collect            - Fetch and store price history");
    println!("  POST /analysis/:symbol   - Run and persist analysis");
    println!("  GET  /analysis/:symbol   - Stored analysis results");
    println!();

    run_server(config).await
}
