//! HTTP API: cast a vote, run a standalone simulation, read the audit history.
//!
//! Every route is served both at the root and under `/api`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::adversary::EveModel;
use crate::audit::{AuditEntry, AuditLog};
use crate::decision::{SecurityCheck, VoteStatus};
use crate::error::{ErrorClass, LowSample, QvoteError};
use crate::rng::RandomSource;
use crate::simulation::{self, SimulationParams};
use crate::{util, vote};

/// Shared server state.
pub struct AppState {
    log: Arc<dyn AuditLog>,
    params: SimulationParams,
    /// Adversary parameters; `active` is set per request.
    eve: EveModel,
    seed: Option<u64>,
    runs: AtomicU64,
}

impl AppState {
    pub fn new(
        log: Arc<dyn AuditLog>,
        params: SimulationParams,
        eve: EveModel,
        seed: Option<u64>,
    ) -> Self {
        Self {
            log,
            params,
            eve,
            seed,
            runs: AtomicU64::new(0),
        }
    }

    /// A fresh, unshared source for one run.
    fn next_rng(&self) -> RandomSource {
        let n = self.runs.fetch_add(1, Ordering::Relaxed);
        match self.seed {
            Some(seed) => RandomSource::seeded(seed.wrapping_add(n)),
            None => RandomSource::from_entropy(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    #[serde(alias = "partyId")]
    pub party_id: String,
    #[serde(default, alias = "eveEnabled")]
    pub eve_enabled: bool,
}

#[derive(Debug, Serialize)]
struct CastVoteResponse {
    vote_id: String,
    status: VoteStatus,
    qber: f64,
    chsh_s: f64,
    security_check: SecurityCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit: Option<AuditEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SimulationQuery {
    eve: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SimulationResponse {
    bb84_data: Vec<u8>,
    e91_data: Vec<f64>,
    eve_enabled: bool,
    qber: f64,
    chsh_s: f64,
    status: VoteStatus,
    security_check: SecurityCheck,
    log_output: Vec<String>,
    warnings: Vec<LowSample>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    timestamp: String,
    vote_id: String,
    status: VoteStatus,
    qber: f64,
    chsh_s: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    retryable: bool,
}

/// [`QvoteError`] rendered as an HTTP response.
struct ApiError(QvoteError);

impl From<QvoteError> for ApiError {
    fn from(e: QvoteError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_class() {
            ErrorClass::InvalidParameter => StatusCode::BAD_REQUEST,
            ErrorClass::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            field: self.0.field().map(str::to_string),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QvoteError::Other(format!("worker task failed: {e}")))?
        .map_err(ApiError)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_cast_vote(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CastVoteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) =
        payload.map_err(|rej| QvoteError::invalid("body", rej.body_text()))?;

    let eve = state.eve.with_active(req.eve_enabled);
    let params = state.params;
    let mut rng = state.next_rng();
    let st = Arc::clone(&state);
    let outcome = blocking(move || {
        vote::cast_vote(st.log.as_ref(), &req.party_id, &eve, &params, &mut rng)
    })
    .await?;

    let mut body = CastVoteResponse {
        vote_id: outcome.record.vote_id,
        status: outcome.record.status,
        qber: outcome.record.qber,
        chsh_s: outcome.record.chsh_s,
        security_check: outcome.run.security_check,
        audit: None,
        error: None,
        retryable: None,
    };
    match outcome.audit {
        Ok(entry) => {
            body.audit = Some(entry);
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        Err(e) => {
            error!(error = %e, "audit append failed; returning result with 503");
            body.retryable = Some(e.is_retryable());
            body.error = Some(e.to_string());
            Ok((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response())
        }
    }
}

async fn handle_simulation(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SimulationQuery>, QueryRejection>,
) -> Result<Json<SimulationResponse>, ApiError> {
    let Query(q) = query.map_err(|rej| QvoteError::invalid("eve", rej.body_text()))?;
    let eve = state.eve.with_active(q.eve.unwrap_or(false));
    let params = state.params;
    let mut rng = state.next_rng();

    let run = blocking(move || simulation::run(&params, &eve, &mut rng)).await?;
    let log_output = run.trace();
    Ok(Json(SimulationResponse {
        eve_enabled: run.eve_enabled,
        qber: run.qber,
        chsh_s: run.chsh_s,
        status: run.security_check.status,
        security_check: run.security_check,
        log_output,
        warnings: run.warnings,
        bb84_data: run.bb84_series,
        e91_data: run.e91_series,
    }))
}

async fn handle_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let log = Arc::clone(&state.log);
    let records = blocking(move || log.read_all()).await?;
    Ok(Json(
        records
            .into_iter()
            .map(|r| HistoryEntry {
                timestamp: r.timestamp,
                vote_id: r.vote_id,
                status: r.status,
                qber: r.qber,
                chsh_s: r.chsh_s,
            })
            .collect(),
    ))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let log = Arc::clone(&state.log);
    match blocking(move || log.len()).await {
        Ok(n) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "audit_records": n })),
        ),
        Err(ApiError(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded", "error": e.to_string() })),
        ),
    }
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "qvote",
        "version": util::VERSION,
        "qubit_count": state.params.qubit_count,
        "chsh_trials": state.params.chsh_trials,
        "thresholds": {
            "qber": crate::decision::QBER_THRESHOLD,
            "chsh": crate::decision::CHSH_CLASSICAL_BOUND,
        },
        "endpoints": {
            "/cast-vote": "POST {party_id, eve_enabled} -> {vote_id, status, qber, chsh_s}",
            "/simulation": "GET ?eve=true|false -> {bb84_data, e91_data, eve_enabled, log_output}",
            "/history": "GET -> [{timestamp, vote_id, status, qber, chsh_s}]",
            "/health": "Health check",
        },
    }))
}

/// Build the axum router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/cast-vote", post(handle_cast_vote))
        .route("/simulation", get(handle_simulation))
        .route("/history", get(handle_history))
        .route("/health", get(handle_health));

    Router::new()
        .route("/", get(handle_index))
        .merge(api.clone())
        .nest("/api", api)
        .with_state(Arc::new(state))
}

/// Run the HTTP server until the process is stopped.
pub async fn run_server(state: AppState, host: &str, port: u16) -> crate::error::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "qvote server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
