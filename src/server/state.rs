//! Shared application state for the API server

use crate::config::{AppConfig, ConfigError};
use crate::freshness::FreshnessReconciler;
use crate::sqlite_store::SqliteStore;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state
pub struct AppState {
    /// Wrapped in Mutex because SQLite connections are not thread-safe.
    /// Handlers lock it from blocking tasks with `blocking_lock`.
    pub store: Arc<Mutex<SqliteStore>>,
    pub config: AppConfig,
    pub reconciler: FreshnessReconciler,
}

impl AppState {
    /// Creates a new application state
    ///
    /// # Errors
    /// Returns an error if the configured exchange timezone is unknown.
    pub fn new(store: SqliteStore, config: AppConfig) -> Result<Self, ConfigError> {
        let reconciler = FreshnessReconciler::new(config.exchange_tz()?);
        Ok(AppState {
            store: Arc::new(Mutex::new(store)),
            config,
            reconciler,
        })
    }
}
