//! Index Options Engine Binary
//!
//! Starts the feed client, chain pipeline and HTTP API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin index-options-engine
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DHAN_CLIENT_ID`: Dhan client id
//! - `DHAN_ACCESS_TOKEN`: Dhan access token
//!
//! ## Optional
//! - `INSTRUMENT_CSV_PATH`: instrument master (default: api-scrip-master-detailed.csv)
//! - `INSTRUMENTS`: `SEG:ID,...` subscription list (default: derived from the master)
//! - `HTTP_PORT`: HTTP server port (default: 8082)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use index_options_engine::application::services::{
    DecisionService, FeedPipeline, GreeksService, RecomputeScheduler,
};
use index_options_engine::domain::decision::StrategyTable;
use index_options_engine::domain::instrument::{InstrumentResolver, InstrumentTable};
use index_options_engine::infrastructure::config::{EngineConfig, FeedSettings};
use index_options_engine::infrastructure::dhan::{
    DhanFeedClient, FeedClientConfig, FeedState, SubscriptionInstrument,
};
use index_options_engine::infrastructure::http::{AppState, HttpServer};
use index_options_engine::infrastructure::instruments::load_instruments;
use index_options_engine::infrastructure::store::InMemoryStateStore;
use index_options_engine::infrastructure::telemetry;
use index_options_engine::{StateStore, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Segment of index option contracts.
const OPTIONS_SEGMENT: &str = "NSE_FNO";

/// Segment of index spot ticks.
const INDEX_SEGMENT: &str = "IDX_I";

/// Cadence of cache and store expiry sweeps.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting index options engine");

    let _metrics_handle = init_metrics();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let table = load_instruments(&config.instrument_csv_path).with_context(|| {
        format!(
            "failed to load instrument master {}",
            config.instrument_csv_path.display()
        )
    })?;
    tracing::info!(contracts = table.len(), "Instrument table loaded");

    let instruments = subscription_list(&config.feed, &table, &config.decision.strategies);
    if instruments.is_empty() {
        anyhow::bail!("no instruments to subscribe");
    }
    tracing::info!(instruments = instruments.len(), "Subscription list prepared");

    let shutdown_token = CancellationToken::new();
    let store = Arc::new(InMemoryStateStore::new());
    let state_store: Arc<dyn StateStore> = store.clone();
    let resolver = Arc::new(InstrumentResolver::new(table));

    // Services
    let greeks = Arc::new(GreeksService::new(config.greeks.clone()));
    let recompute = Arc::new(RecomputeScheduler::new(
        Arc::clone(&greeks),
        Arc::clone(&state_store),
        config.greeks.recompute_debounce,
        config.greeks.chain_window,
        config.greeks.cache_ttl,
        shutdown_token.clone(),
    ));
    let pipeline = Arc::new(
        FeedPipeline::new(
            resolver,
            Arc::clone(&state_store),
            config.chain.min_complete_strikes,
            config.chain.snapshot_ttl,
            config.feed.spot_security_ids.clone(),
        )
        .with_recompute(recompute),
    );
    pipeline.set_active(&instruments);
    let decisions = Arc::new(DecisionService::new(
        Arc::clone(&state_store),
        config.decision.clone(),
    ));

    // Feed client
    let feed_state = Arc::new(FeedState::new());
    let (event_tx, event_rx) = mpsc::channel(4096);
    let client_config = FeedClientConfig::from_settings(&config.feed, &config.credentials, instruments);
    let (client, feed_handle) = DhanFeedClient::new(
        client_config,
        Arc::clone(&feed_state),
        event_tx,
        shutdown_token.clone(),
    );
    let client = Arc::new(client);

    let client_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = client.run().await {
            tracing::error!(error = %e, "Feed client stopped");
            client_shutdown.cancel();
        }
    });

    let pipeline_task = Arc::clone(&pipeline);
    let pipeline_cancel = shutdown_token.clone();
    tokio::spawn(async move {
        pipeline_task.run(event_rx, pipeline_cancel).await;
    });

    let housekeeping_greeks = Arc::clone(&greeks);
    let housekeeping_cancel = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            tokio::select! {
                () = housekeeping_cancel.cancelled() => break,
                _ = interval.tick() => {
                    let purged = store.purge_expired();
                    housekeeping_greeks.purge_expired();
                    tracing::trace!(purged, "Expired entries swept");
                }
            }
        }
    });

    // HTTP server
    let app_state = AppState {
        decisions,
        greeks,
        pipeline,
        store: state_store,
        feed: feed_state,
        feed_handle: Some(feed_handle),
        chain_window: config.greeks.chain_window,
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Instant::now(),
    };
    let http_server = HttpServer::new(config.server.http_port, app_state, shutdown_token.clone());
    let http_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
            http_shutdown.cancel();
        }
    });

    tracing::info!("Index options engine ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Index options engine stopped");
    Ok(())
}

/// Configured instruments, or every option contract of a configured
/// underlying plus the index spot ids.
fn subscription_list(
    feed: &FeedSettings,
    table: &InstrumentTable,
    strategies: &StrategyTable,
) -> Vec<SubscriptionInstrument> {
    if !feed.instruments.is_empty() {
        return feed.instruments.clone();
    }

    let underlyings: HashSet<&str> = strategies.underlyings().into_iter().collect();
    let mut ids: Vec<u32> = table
        .iter()
        .filter(|i| underlyings.contains(i.underlying_symbol.as_str()))
        .map(|i| i.security_id)
        .collect();
    ids.sort_unstable();

    let mut spot_ids: Vec<u32> = feed.spot_security_ids.keys().copied().collect();
    spot_ids.sort_unstable();

    ids.into_iter()
        .map(|id| SubscriptionInstrument::new(OPTIONS_SEGMENT, id.to_string()))
        .chain(
            spot_ids
                .into_iter()
                .map(|id| SubscriptionInstrument::new(INDEX_SEGMENT, id.to_string())),
        )
        .collect()
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        mode = ?config.feed.mode,
        http_port = config.server.http_port,
        underlyings = ?config.decision.strategies.underlyings(),
        min_complete_strikes = config.chain.min_complete_strikes,
        "Configuration loaded"
    );
    tracing::debug!(feed = ?config.feed, "Feed settings");
}

/// Wait for shutdown signal (SIGTERM or SIGINT) or an internal cancel.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal task requested shutdown");
        }
    }

    shutdown_token.cancel();
}
