//! HTTP Controller (Driver Adapter)
//!
//! Axum routes delegating to the application services.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use crate::application::ports::{StateStore, StoreError, keys};
use crate::application::services::{
    BatchResponse, ChainGreeks, DashboardState, DecisionError, DecisionService, FeedPipeline,
    GreeksError, GreeksRequest, GreeksResponse, GreeksService,
};
use crate::domain::chain::ChainKey;
use crate::domain::decision::{DecideRequest, DecisionResult};
use crate::infrastructure::dhan::{FeedHandle, FeedState};
use crate::infrastructure::metrics::get_metrics_handle;

use super::request::{BatchGreeksRequest, ChainWindowQuery, SubscribeRequest};
use super::response::{
    ErrorResponse, HealthResponse, HealthStatus, LiveState, LiveStatusResponse, SubscribeResponse,
};

// =============================================================================
// State
// =============================================================================

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Decision pipeline.
    pub decisions: Arc<DecisionService>,
    /// Greeks engine.
    pub greeks: Arc<GreeksService>,
    /// Feed pipeline, for chain counts.
    pub pipeline: Arc<FeedPipeline>,
    /// Shared store.
    pub store: Arc<dyn StateStore>,
    /// Feed connection tracker.
    pub feed: Arc<FeedState>,
    /// Command handle of the running feed client.
    pub feed_handle: Option<FeedHandle>,
    /// Default chain window.
    pub chain_window: usize,
    /// Engine version.
    pub version: String,
    /// Process start.
    pub started_at: Instant,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status/live", get(live_status_handler))
        .route("/decision/latest", get(latest_decision_handler))
        .route("/decide", post(decide_handler))
        .route("/signal/{underlying}/{expiry}", get(signal_handler))
        .route("/greeks", post(greeks_handler))
        .route("/greeks/batch", post(greeks_batch_handler))
        .route("/greeks/chain/{symbol}/{expiry}", get(greeks_chain_handler))
        .route("/subscribe", post(subscribe_handler))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let feed = state.feed.snapshot();
    let status = if state.feed.is_subscribed() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };
    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        chains: state.pipeline.chain_count(),
        greeks_cache_entries: state.greeks.cache_len(),
    })
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.feed.is_subscribed() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

#[allow(clippy::cast_precision_loss)]
async fn live_status_handler(
    State(state): State<AppState>,
) -> Result<Json<LiveStatusResponse>, ApiError> {
    let last_packet_ts = state.store.get(keys::LIVE_LAST_PACKET_TS).await?;
    let now = Utc::now().timestamp_millis() as f64 / 1000.0;
    Ok(Json(LiveStatusResponse {
        status: if last_packet_ts.is_some() {
            LiveState::Connected
        } else {
            LiveState::Waiting
        },
        last_packet_ts,
        now,
    }))
}

// =============================================================================
// Decisions
// =============================================================================

async fn latest_decision_handler(State(state): State<AppState>) -> Json<DashboardState> {
    Json(state.decisions.dashboard_state())
}

async fn decide_handler(
    State(state): State<AppState>,
    Json(request): Json<DecideRequest>,
) -> Json<DecisionResult> {
    Json(state.decisions.decide(request).await)
}

async fn signal_handler(
    State(state): State<AppState>,
    Path((underlying, expiry)): Path<(String, String)>,
) -> Result<Json<DecisionResult>, ApiError> {
    let decision = state
        .decisions
        .decide_from_snapshot(&underlying, &expiry)
        .await?;
    Ok(Json(decision))
}

// =============================================================================
// Greeks
// =============================================================================

async fn greeks_handler(
    State(state): State<AppState>,
    Json(request): Json<GreeksRequest>,
) -> Result<Json<GreeksResponse>, ApiError> {
    Ok(Json(state.greeks.compute(&request)?))
}

async fn greeks_batch_handler(
    State(state): State<AppState>,
    Json(body): Json<BatchGreeksRequest>,
) -> Json<BatchResponse> {
    let requests = body.into_requests();
    tracing::debug!(count = requests.len(), "Pricing batch");
    Json(state.greeks.compute_batch(&requests))
}

async fn greeks_chain_handler(
    State(state): State<AppState>,
    Path((symbol, expiry)): Path<(String, String)>,
    Query(query): Query<ChainWindowQuery>,
) -> Result<Json<ChainGreeks>, ApiError> {
    let key = ChainKey::new(symbol, expiry);
    let snapshot = state.decisions.load_snapshot(&key).await?;
    let window = query.window.unwrap_or(state.chain_window);
    Ok(Json(state.greeks.compute_chain(&snapshot, window)?))
}

// =============================================================================
// Subscription
// =============================================================================

async fn subscribe_handler(
    State(state): State<AppState>,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let instruments = body
        .parse()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    if instruments.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty instruments list"));
    }
    let handle = state.feed_handle.as_ref().ok_or_else(|| {
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "feed client not running")
    })?;
    handle
        .resubscribe(instruments.clone())
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    tracing::info!(count = instruments.len(), "Enqueued resubscribe command");
    Ok(Json(SubscribeResponse {
        ok: true,
        subscribed: instruments,
    }))
}

// =============================================================================
// Errors
// =============================================================================

/// Error rendered as `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create an error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
    }
}

impl From<DecisionError> for ApiError {
    fn from(error: DecisionError) -> Self {
        let status = match &error {
            DecisionError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            DecisionError::SnapshotNotFound(_) => StatusCode::NOT_FOUND,
            DecisionError::MissingSpot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, error.to_string())
    }
}

impl From<GreeksError> for ApiError {
    fn from(error: GreeksError) -> Self {
        let status = match &error {
            GreeksError::InvalidExpiry(_)
            | GreeksError::MissingVolatility
            | GreeksError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GreeksError::ImpliedVol(_)
            | GreeksError::MissingSpot(_)
            | GreeksError::EmptyChain(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::set_json;
    use crate::domain::chain::{OptionChainSnapshot, OptionLeg, StrikeLegs};
    use crate::domain::instrument::InstrumentResolver;
    use crate::infrastructure::config::{DecisionSettings, GreeksSettings};
    use crate::infrastructure::dhan::{DhanFeedClient, FeedClientConfig, FeedMode, ReconnectConfig};
    use crate::infrastructure::store::InMemoryStateStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn expiry() -> String {
        (Utc::now() + chrono::Duration::days(14))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn make_state(store: Arc<InMemoryStateStore>, feed_handle: Option<FeedHandle>) -> AppState {
        let decision_settings = DecisionSettings {
            strategies: crate::domain::decision::StrategyTable::builtin(),
            ..DecisionSettings::default()
        };
        AppState {
            decisions: Arc::new(DecisionService::new(store.clone(), decision_settings)),
            greeks: Arc::new(GreeksService::new(GreeksSettings::default())),
            pipeline: Arc::new(FeedPipeline::new(
                Arc::new(InstrumentResolver::default()),
                store.clone(),
                10,
                Duration::from_secs(15),
                HashMap::new(),
            )),
            store,
            feed: Arc::new(FeedState::new()),
            feed_handle,
            chain_window: 2,
            version: "test".to_string(),
            started_at: Instant::now(),
        }
    }

    fn feed_handle() -> (DhanFeedClient, FeedHandle) {
        let config = FeedClientConfig {
            url: "ws://127.0.0.1:1".to_string(),
            mode: FeedMode::Full,
            instruments: Vec::new(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(20),
        };
        let (tx, _rx) = mpsc::channel(4);
        DhanFeedClient::new(config, Arc::new(FeedState::new()), tx, CancellationToken::new())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_degraded_before_subscription() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));
        let (status, json) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["feed"]["state"], "disconnected");
    }

    #[tokio::test]
    async fn readiness_follows_feed_state() {
        let state = make_state(Arc::new(InMemoryStateStore::new()), None);
        let feed = Arc::clone(&state.feed);
        let app = create_router(state);

        let response = app.clone().oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        feed.set_state(crate::infrastructure::dhan::ConnectionState::Subscribed);
        let response = app.oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn live_status_waits_for_heartbeat() {
        let store = Arc::new(InMemoryStateStore::new());
        let app = create_router(make_state(store.clone(), None));

        let (_, json) = send(app.clone(), get("/status/live")).await;
        assert_eq!(json["status"], "waiting");
        assert!(json["last_packet_ts"].is_null());

        store
            .set(keys::LIVE_LAST_PACKET_TS, "1737350000".to_string(), None)
            .await
            .unwrap();
        let (_, json) = send(app, get("/status/live")).await;
        assert_eq!(json["status"], "connected");
        assert_eq!(json["last_packet_ts"], "1737350000");
        assert!(json["now"].as_f64().unwrap() > 1.7e9);
    }

    #[tokio::test]
    async fn decide_then_latest() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));

        let (_, json) = send(app.clone(), get("/decision/latest")).await;
        assert_eq!(json, serde_json::json!({"state": "INIT", "last_updated": null}));

        let body = serde_json::json!({
            "underlying": "NIFTY",
            "expiry": "2025-01-23",
            "spot": 24050.0,
            "instruments": []
        });
        let (status, decision) = send(app.clone(), post("/decide", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decision["action"], "NO_TRADE");
        assert_eq!(decision["strategy"], "FILTER");

        let (_, json) = send(app, get("/decision/latest")).await;
        assert_eq!(json["decision_id"], decision["decision_id"]);
    }

    #[tokio::test]
    async fn signal_without_snapshot_is_not_found() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));
        let (status, json) = send(app, get("/signal/NIFTY/2025-01-23")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("NIFTY:2025-01-23"));
    }

    #[tokio::test]
    async fn greeks_requires_volatility_or_price() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));
        let body = serde_json::json!({
            "symbol": "NIFTY",
            "underlying": 24000.0,
            "strike": 24000.0,
            "expiry": expiry(),
            "option_type": "CE"
        });
        let (status, json) = send(app.clone(), post("/greeks", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Either iv or option_price must be provided");

        let mut priced = body;
        priced["iv"] = serde_json::json!(0.15);
        let (status, json) = send(app, post("/greeks", &priced)).await;
        assert_eq!(status, StatusCode::OK);
        let delta = json["delta"].as_f64().unwrap();
        assert!(delta > 0.4 && delta < 0.7);
    }

    #[tokio::test]
    async fn greeks_batch_reports_item_errors() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));
        let good = serde_json::json!({
            "symbol": "NIFTY", "underlying": 24000.0, "strike": 24100.0,
            "expiry": expiry(), "option_type": "PE", "iv": 0.14
        });
        let bad = serde_json::json!({
            "symbol": "NIFTY", "underlying": 24000.0, "strike": 24100.0,
            "expiry": "not-a-date", "option_type": "PE", "iv": 0.14
        });
        let body = serde_json::json!({ "requests": [good, bad] });
        let (status, json) = send(app, post("/greeks/batch", &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert!(json["results"][0]["delta"].is_number());
        assert_eq!(json["results"][1]["expiry"], "not-a-date");
        assert!(json["results"][1]["error"].is_string());
    }

    #[tokio::test]
    async fn greeks_chain_reads_published_snapshot() {
        let store = Arc::new(InMemoryStateStore::new());
        let expiry = expiry();
        let mut strikes = BTreeMap::new();
        for (i, strike) in (23_800..=24_200).step_by(100).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let premium = 60.0 + 10.0 * i as f64;
            let leg = OptionLeg {
                last_price: premium,
                open_interest: 100,
                volume: 10,
            };
            strikes.insert(
                strike,
                StrikeLegs {
                    call: Some(leg),
                    put: Some(leg),
                },
            );
        }
        let snapshot = OptionChainSnapshot {
            underlying: "NIFTY".to_string(),
            expiry: expiry.clone(),
            timestamp: 1,
            spot: Some(24_010.0),
            atm: Some(24_000),
            strikes,
        };
        let key = snapshot.key();
        set_json(store.as_ref(), &key.current_key(), &snapshot, None)
            .await
            .unwrap();

        let app = create_router(make_state(store, None));
        let (status, json) = send(app, get(&format!("/greeks/chain/NIFTY/{expiry}?window=1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["atm"], 24_000);
        assert_eq!(json["strikes"], serde_json::json!([23_900, 24_000, 24_100]));
    }

    #[tokio::test]
    async fn subscribe_validates_and_queues() {
        let (_client, handle) = feed_handle();
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), Some(handle)));

        let (status, json) = send(
            app.clone(),
            post("/subscribe", &serde_json::json!({"instruments": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Empty instruments list");

        let (status, _) = send(
            app.clone(),
            post("/subscribe", &serde_json::json!({"instruments": ["bogus"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            app,
            post(
                "/subscribe",
                &serde_json::json!({"instruments": ["NSE_FNO:35001", "IDX_I:13"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["subscribed"][0]["SecurityId"], "35001");
    }

    #[tokio::test]
    async fn subscribe_without_client_is_unavailable() {
        let app = create_router(make_state(Arc::new(InMemoryStateStore::new()), None));
        let (status, _) = send(
            app,
            post("/subscribe", &serde_json::json!({"instruments": ["NSE_FNO:1"]})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
