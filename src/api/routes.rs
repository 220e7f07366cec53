use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::status::StatusReport;
use crate::refresh::{RefreshCoordinator, RefreshTrigger};
use crate::state::{CacheRead, ProgressView};
use crate::types::{Phase, Record};

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: RefreshCoordinator,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/markets", get(get_markets))
        .route("/api/status", get(get_status))
        .route("/api/refresh", get(trigger_refresh))
        .route("/health", get(get_health))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct MarketsResponse<'a> {
    pub records: &'a [Record],
    pub total_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub in_flight: bool,
    /// True until the first cycle publishes a snapshot.
    pub loading: bool,
    pub progress: ProgressView,
    pub rewards_count: usize,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub status: RefreshTrigger,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: Phase,
    pub in_flight: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_markets(State(state): State<ApiState>) -> Response {
    let c = &state.coordinator;
    let read = c.read();
    let snapshot = read.snapshot();

    let body = MarketsResponse {
        records: snapshot.map_or(&[][..], |s| s.records()),
        total_count: snapshot.map_or(0, |s| s.len()),
        last_updated: snapshot.map(|s| s.updated_at()),
        in_flight: c.progress().in_flight(),
        loading: matches!(read, CacheRead::Loading),
        progress: c.progress().view(),
        rewards_count: c.rewards_count(),
    };
    Json(body).into_response()
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusReport> {
    Json(state.coordinator.snapshot_status())
}

/// Fire-and-forget: the cycle runs in the background.
async fn trigger_refresh(State(state): State<ApiState>) -> Json<RefreshResponse> {
    Json(RefreshResponse {
        status: state.coordinator.start_refresh(),
    })
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let progress = state.coordinator.progress();
    Json(HealthResponse {
        status: "ok",
        phase: progress.phase(),
        in_flight: progress.in_flight(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use super::*;
    use crate::refresh::test_support::{key_set, ScriptedKeys, ScriptedListing};
    use crate::refresh::RefreshSettings;
    use crate::types::test_support::record;

    fn coordinator(listing: ScriptedListing, keys: ScriptedKeys) -> RefreshCoordinator {
        RefreshCoordinator::new(
            Arc::new(listing),
            Arc::new(keys),
            RefreshSettings {
                interval: Duration::from_secs(300),
                adapter_timeout: Duration::from_secs(60),
            },
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn wait_idle(c: &RefreshCoordinator, cycles: u64) {
        for _ in 0..1_000 {
            if c.progress().cycles_completed() >= cycles && !c.progress().in_flight() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cycle did not finish");
    }

    #[tokio::test]
    async fn markets_before_first_cycle_is_loading() {
        let c = coordinator(ScriptedListing::new(vec![]), ScriptedKeys::new(vec![]));
        let (status, body) = get_json(router(ApiState { coordinator: c }), "/api/markets").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loading"], true);
        assert_eq!(body["records"], Value::Array(vec![]));
        assert_eq!(body["total_count"], 0);
        assert_eq!(body["last_updated"], Value::Null);
        assert_eq!(body["progress"]["status"], "idle");
    }

    #[tokio::test]
    async fn markets_after_cycle_serves_flagged_records() {
        let listing = ScriptedListing::new(vec![vec![
            record("1", "alpha", Some(35.0), Some(65.0)),
            record("2", "beta", Some(70.0), Some(30.0)),
            record("3", "placeholder", None, None),
        ]]);
        let keys = ScriptedKeys::new(vec![Some(key_set(&["alpha"]))]);
        let c = coordinator(listing, keys);
        c.start_refresh();
        wait_idle(&c, 1).await;

        let (_, body) = get_json(router(ApiState { coordinator: c }), "/api/markets").await;

        assert_eq!(body["loading"], false);
        assert_eq!(body["in_flight"], false);
        assert_eq!(body["total_count"], 2);
        assert_eq!(body["rewards_count"], 1);
        assert_eq!(body["records"][0]["slug"], "alpha");
        assert_eq!(body["records"][0]["has_rewards"], true);
        assert_eq!(body["records"][1]["has_rewards"], false);
        assert_eq!(
            body["progress"],
            serde_json::json!({"markets": 2, "rewards": 1, "status": "ready"})
        );
        assert!(body["last_updated"].is_string());
    }

    #[tokio::test]
    async fn refresh_reports_started_then_busy() {
        let gate = Arc::new(Notify::new());
        let c = coordinator(
            ScriptedListing::new(vec![vec![]]).gated(Arc::clone(&gate)),
            ScriptedKeys::new(vec![]),
        );
        let app = router(ApiState { coordinator: c.clone() });

        let (_, first) = get_json(app.clone(), "/api/refresh").await;
        let (_, second) = get_json(app.clone(), "/api/refresh").await;
        assert_eq!(first["status"], "started");
        assert_eq!(second["status"], "busy");

        let (_, status) = get_json(app, "/api/status").await;
        assert_eq!(status["in_flight"], true);
        assert_eq!(status["phase"], "fetching");

        gate.notify_one();
        wait_idle(&c, 1).await;
        assert_eq!(c.combine_count(), 1);
    }

    #[tokio::test]
    async fn status_reports_cycle_counters() {
        let c = coordinator(
            ScriptedListing::new(vec![vec![record("1", "a", Some(1.0), Some(99.0))]]),
            ScriptedKeys::new(vec![None]),
        );
        c.start_refresh();
        wait_idle(&c, 1).await;

        let (status, body) = get_json(router(ApiState { coordinator: c }), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "ready");
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["cycles_completed"], 1);
        assert_eq!(body["rewards_failures"], 1);
        assert_eq!(body["listing_failures"], 0);
        assert!(body["last_cycle_ms"].is_u64());
    }

    #[tokio::test]
    async fn health_is_ok_and_cors_open() {
        let c = coordinator(ScriptedListing::new(vec![]), ScriptedKeys::new(vec![]));
        let res = router(ApiState { coordinator: c })
            .oneshot(
                Request::get("/health")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["phase"], "idle");
    }
}
