//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task;

use super::error::ApiError;
use super::state::AppState;
use crate::analytics::engine::StatisticsEngine;
use crate::analytics::result::{AnalysisResult, CombinedResult};
use crate::calendar::last_trading_day_at;
use crate::store::ResultStore;
use crate::symbol::Symbol;
use crate::yahoo_finance::YahooFinanceDownloader;

/// Health check endpoint
///
/// Returns a simple status response to verify the server is running
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}

/// Body of `POST /collect`
#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub identifier: String,
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub symbol: Symbol,
    /// Bars newly written; zero when the source returned nothing.
    pub inserted: usize,
}

/// POST /collect - Fetch default history for a symbol and store it
pub async fn collect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CollectRequest>,
) -> Result<Json<CollectResponse>, ApiError> {
    let symbol = Symbol::new(&request.identifier)?;

    // The blocking HTTP client must be created and dropped off the runtime.
    let task_symbol = symbol.clone();
    let inserted = task::spawn_blocking(move || -> Result<usize, ApiError> {
        let downloader = YahooFinanceDownloader::with_config(state.config.downloader.clone())?;
        let today = Utc::now().with_timezone(&state.reconciler.timezone());
        let end_date = last_trading_day_at(&today);

        let mut store = state.store.blocking_lock();
        let mut engine = StatisticsEngine::new(&mut *store, downloader, state.reconciler);
        Ok(engine.collect(&task_symbol, end_date)?)
    })
    .await??;

    Ok(Json(CollectResponse { symbol, inserted }))
}

/// POST /analysis/{symbol} - Reconcile, compute and persist statistics
pub async fn run_analysis(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<CombinedResult>, ApiError> {
    let symbol = Symbol::new(&symbol)?;

    let result = task::spawn_blocking(move || -> Result<CombinedResult, ApiError> {
        let downloader = YahooFinanceDownloader::with_config(state.config.downloader.clone())?;

        let mut store = state.store.blocking_lock();
        let mut engine = StatisticsEngine::new(&mut *store, downloader, state.reconciler)
            .with_correlation_bars(state.config.correlation_bars);
        Ok(engine.analyze(&symbol)?)
    })
    .await??;

    Ok(Json(result))
}

/// GET /analysis/{symbol} - Stored analysis rows for a symbol
pub async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<AnalysisResult>>, ApiError> {
    let symbol = Symbol::new(&symbol)?;

    let store = state.store.lock().await;
    let rows = store.load_results(&symbol)?;
    if rows.is_empty() {
        return Err(ApiError::SymbolNotFound(symbol.to_string()));
    }

    Ok(Json(rows))
}
