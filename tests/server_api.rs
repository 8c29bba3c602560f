use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt as _;

use qvote_core::{
    adversary::EveModel,
    audit::{AuditEntry, AuditLog, MemoryAuditLog},
    error::QvoteError,
    server::{build_router, AppState},
    simulation::SimulationParams,
    vote::VoteRecord,
};

struct OfflineLog;

impl AuditLog for OfflineLog {
    fn append(&self, _record: &VoteRecord) -> qvote_core::error::Result<AuditEntry> {
        Err(QvoteError::StoreUnavailable("database is locked".into()))
    }
    fn read_all(&self) -> qvote_core::error::Result<Vec<VoteRecord>> {
        Err(QvoteError::StoreUnavailable("database is locked".into()))
    }
}

fn app(log: Arc<dyn AuditLog>) -> Router {
    build_router(AppState::new(
        log,
        SimulationParams::default(),
        EveModel::attack(1.0, 0.5).with_active(false),
        Some(42),
    ))
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, Value)> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

fn post_json(uri: &str, body: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}

fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn cast_vote_then_history() -> Result<()> {
    let log: Arc<dyn AuditLog> = Arc::new(MemoryAuditLog::new());
    let app = app(Arc::clone(&log));

    let (status, body) = send(
        &app,
        post_json("/cast-vote", r#"{"party_id":"PARTY_A","eve_enabled":false}"#)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SECURE");
    assert_eq!(body["qber"], 0.0);
    assert!(body["vote_id"].as_str().is_some_and(|s| s.starts_with("0x")));

    let (status, body) = send(
        &app,
        post_json("/api/cast-vote", r#"{"partyId":"PARTY_B","eveEnabled":true}"#)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");

    let (status, history) = send(&app, get("/history")?).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = history.as_array().cloned().unwrap_or_default();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["status"], "SECURE");
    assert_eq!(entries[1]["status"], "REJECTED");
    for e in &entries {
        let mut keys: Vec<&str> = e.as_object().map(|o| o.keys().map(String::as_str).collect()).unwrap_or_default();
        keys.sort_unstable();
        assert_eq!(keys, ["chsh_s", "qber", "status", "timestamp", "vote_id"]);
    }
    assert_eq!(log.len()?, 2);
    Ok(())
}

#[tokio::test]
async fn cast_vote_rejects_bad_input() -> Result<()> {
    let log: Arc<dyn AuditLog> = Arc::new(MemoryAuditLog::new());
    let app = app(Arc::clone(&log));

    let (status, body) = send(&app, post_json("/cast-vote", r#"{"eve_enabled":true}"#)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "body");

    let (status, body) = send(&app, post_json("/cast-vote", "{not json")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "body");

    let (status, body) = send(&app, post_json("/cast-vote", r#"{"party_id":"  "}"#)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "party_id");
    assert_eq!(body["retryable"], false);

    assert_eq!(log.len()?, 0);
    Ok(())
}

#[tokio::test]
async fn store_failure_returns_result_with_503() -> Result<()> {
    let app = app(Arc::new(OfflineLog));

    let (status, body) =
        send(&app, post_json("/cast-vote", r#"{"party_id":"PARTY_A"}"#)?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "SECURE");
    assert_eq!(body["retryable"], true);
    assert!(body["error"].as_str().is_some());

    let (status, body) = send(&app, get("/history")?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    let (status, body) = send(&app, get("/health")?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    Ok(())
}

#[tokio::test]
async fn simulation_endpoint() -> Result<()> {
    let app = app(Arc::new(MemoryAuditLog::new()));

    let (status, clean) = send(&app, get("/simulation")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clean["eve_enabled"], false);
    assert_eq!(clean["status"], "SECURE");
    let bb84 = clean["bb84_data"].as_array().cloned().unwrap_or_default();
    assert!(!bb84.is_empty());
    assert!(bb84.iter().all(|v| v == 0));
    assert!(clean["e91_data"].as_array().is_some_and(|a| !a.is_empty()));
    assert!(clean["log_output"].as_array().is_some_and(|a| !a.is_empty()));

    let (status, tapped) = send(&app, get("/api/simulation?eve=true")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tapped["eve_enabled"], true);
    assert_eq!(tapped["status"], "REJECTED");

    let (status, body) = send(&app, get("/simulation?eve=maybe")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "eve");
    Ok(())
}

#[tokio::test]
async fn index_and_health() -> Result<()> {
    let app = app(Arc::new(MemoryAuditLog::new()));

    let (status, body) = send(&app, get("/")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "qvote");
    assert_eq!(body["thresholds"]["qber"], 0.11);

    let (status, body) = send(&app, get("/api/health")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["audit_records"], 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn simulations_run_off_the_executor() -> Result<()> {
    let heavy = |seed| {
        build_router(AppState::new(
            Arc::new(MemoryAuditLog::new()),
            SimulationParams {
                qubit_count: 20_000,
                chsh_trials: 40_000,
            },
            EveModel::attack(1.0, 0.5).with_active(false),
            Some(seed),
        ))
    };
    let app = heavy(9);

    let (sim, health) = tokio::join!(
        send(&app, get("/simulation?eve=true")?),
        send(&app, get("/health")?),
    );
    let (status, first) = sim?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "REJECTED");
    assert_eq!(health?.0, StatusCode::OK);

    let (_, again) = send(&heavy(9), get("/simulation?eve=true")?).await?;
    assert_eq!(first["qber"], again["qber"]);
    assert_eq!(first["chsh_s"], again["chsh_s"]);
    assert_eq!(first["e91_data"], again["e91_data"]);
    Ok(())
}
