//! REST API server over the statistics engine

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use handlers::{CollectRequest, CollectResponse};
pub use routes::create_router;
pub use state::AppState;

use crate::config::AppConfig;
use crate::sqlite_store::SqliteStore;
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Runs the API server
///
/// Opens the configured database, builds the router and serves until the
/// listener fails. Set `RUST_LOG` to control the log level (default `info`).
///
/// # Example
/// ```rust,no_run
/// use equity_analytics::{run_server, AppConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::from_yaml_str("db_path: stock_data.db")?;
///     run_server(config).await
/// }
/// ```
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let store = SqliteStore::new(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let addr = config.server.address();
    let state = Arc::new(AppState::new(store, config)?);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
