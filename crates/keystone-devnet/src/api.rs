//! HTTP API server for the devnet.
//!
//! Exposes transaction submission, simulation, log queries, typed reads and
//! a time control endpoint over the in-memory ledger.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use keystone_contracts::ContractError;
use keystone_ledger::wire::{
    serve_query, AdvanceTimeRequest, AdvanceTimeResponse, ErrorResponse, Query, QueryResponse, StatusResponse,
    ADVANCE_TIME_PATH, LOGS_PATH, QUERY_PATH, SIMULATE_PATH, STATUS_PATH, TRANSACTIONS_PATH,
};
use keystone_ledger::{LedgerClient, LedgerError, LogEntry, LogFilter, Receipt, Transaction};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::DevnetState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn ledger_error(err: LedgerError) -> ApiError {
    let status = match &err {
        LedgerError::NoContract(_) | LedgerError::Contract(ContractError::UnknownCondition(_)) => StatusCode::NOT_FOUND,
        LedgerError::WrongContractKind { .. } | LedgerError::Contract(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() }))
}

// --- Handlers ---

async fn handle_status(State(state): State<Arc<DevnetState>>) -> Result<Json<StatusResponse>, ApiError> {
    let block_number = state.ledger.block_number().await.map_err(ledger_error)?;
    let now = state.ledger.now().await.map_err(ledger_error)?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: state.network.clone(),
        block_number,
        now,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

async fn handle_send_transaction(
    State(state): State<Arc<DevnetState>>,
    Json(tx): Json<Transaction>,
) -> Result<Json<Receipt>, ApiError> {
    let receipt = state.ledger.send_transaction(tx).await.map_err(ledger_error)?;
    Ok(Json(receipt))
}

async fn handle_simulate(
    State(state): State<Arc<DevnetState>>,
    Json(tx): Json<Transaction>,
) -> Result<Json<Receipt>, ApiError> {
    let receipt = state.ledger.simulate(tx).await.map_err(ledger_error)?;
    Ok(Json(receipt))
}

async fn handle_logs(
    State(state): State<Arc<DevnetState>>,
    Json(filter): Json<LogFilter>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let logs = state.ledger.get_logs(filter).await.map_err(ledger_error)?;
    Ok(Json(logs))
}

async fn handle_query(
    State(state): State<Arc<DevnetState>>,
    Json(query): Json<Query>,
) -> Result<Json<QueryResponse>, ApiError> {
    let response = serve_query(state.ledger.as_ref(), query).await.map_err(ledger_error)?;
    Ok(Json(response))
}

async fn handle_advance_time(
    State(state): State<Arc<DevnetState>>,
    Json(req): Json<AdvanceTimeRequest>,
) -> Result<Json<AdvanceTimeResponse>, ApiError> {
    let now = state.ledger.advance_time(req.seconds).map_err(ledger_error)?;
    tracing::info!(seconds = req.seconds, now, "devnet time advanced");
    Ok(Json(AdvanceTimeResponse { now }))
}

// --- Server ---

pub fn build_router(state: Arc<DevnetState>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(handle_status))
        .route(TRANSACTIONS_PATH, post(handle_send_transaction))
        .route(SIMULATE_PATH, post(handle_simulate))
        .route(LOGS_PATH, post(handle_logs))
        .route(QUERY_PATH, post(handle_query))
        .route(ADVANCE_TIME_PATH, post(handle_advance_time))
        .with_state(state)
}

/// Serve the API on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: Arc<DevnetState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

pub async fn start_api_server<F>(listen_addr: SocketAddr, state: Arc<DevnetState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    serve(listener, state, shutdown).await
}
