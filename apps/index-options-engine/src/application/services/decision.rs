//! Decision Service
//!
//! Runs one decision per request: filters, routing, the strategy evaluator
//! and the risk guard. Every request yields exactly one [`DecisionResult`];
//! store failures and panics inside evaluation become `ERROR` decisions.
//! The latest decision is kept in a single slot replaced atomically.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::application::ports::{
    StateStore, StoreError, get_json, get_number, keys, parse_heartbeat_millis,
};
use crate::domain::chain::{ChainKey, OptionChainSnapshot};
use crate::domain::decision::{
    DecideRequest, DecisionResult, EvaluationContext, FeedHeartbeat, FilterContext, FilterPipeline,
    RiskGuard, SpotBandRouter, StrategyRouter, StrategyTable, evaluate, reasons,
};
use crate::infrastructure::config::DecisionSettings;
use crate::infrastructure::metrics;

/// Strategy label on decisions raised outside any evaluator: `ERROR`s and
/// requests rejected before routing.
pub const ENGINE_STRATEGY: &str = "ENGINE";

/// Failures that prevent evaluation.
#[derive(Debug, Clone, Error)]
pub enum DecisionError {
    /// Store read failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No current or last-good snapshot for the chain.
    #[error("no option chain snapshot for {0}")]
    SnapshotNotFound(String),

    /// Snapshot has no underlying price yet.
    #[error("option chain snapshot for {0} has no spot")]
    MissingSpot(String),
}

/// Decision with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestDecision {
    /// The decision.
    pub decision: DecisionResult,
    /// When it was recorded.
    pub last_updated: DateTime<Utc>,
}

/// Dashboard view of the latest decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DashboardState {
    /// No decision yet.
    Init {
        /// Always `INIT`.
        state: &'static str,
        /// Always null.
        last_updated: Option<DateTime<Utc>>,
    },
    /// Latest decision summary.
    Decided {
        /// Strategy.
        strategy: String,
        /// Action.
        action: &'static str,
        /// Reason.
        reason: Option<String>,
        /// Decision id.
        decision_id: String,
        /// When it was recorded.
        last_updated: DateTime<Utc>,
    },
}

/// Filters → router → evaluator → guard.
pub struct DecisionService {
    store: Arc<dyn StateStore>,
    filters: FilterPipeline,
    router: Box<dyn StrategyRouter>,
    table: StrategyTable,
    guard: RiskGuard,
    latest: RwLock<Option<Arc<LatestDecision>>>,
}

impl DecisionService {
    /// Create a service with the spot-band router.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, settings: DecisionSettings) -> Self {
        Self::with_router(store, settings, Box::new(SpotBandRouter::default()))
    }

    /// Create a service with a custom router.
    #[must_use]
    pub fn with_router(
        store: Arc<dyn StateStore>,
        settings: DecisionSettings,
        router: Box<dyn StrategyRouter>,
    ) -> Self {
        Self {
            store,
            filters: FilterPipeline::new(&settings.filters),
            router,
            table: settings.strategies,
            guard: settings.risk,
            latest: RwLock::new(None),
        }
    }

    /// Decide now.
    pub async fn decide(&self, request: DecideRequest) -> DecisionResult {
        self.decide_at(request, Utc::now()).await
    }

    /// Decide at `now`. Never fails; errors and panics become `ERROR`.
    pub async fn decide_at(&self, request: DecideRequest, now: DateTime<Utc>) -> DecisionResult {
        let started = Instant::now();
        let underlying = request.underlying.clone();

        let outcome = AssertUnwindSafe(self.evaluate(&request, now))
            .catch_unwind()
            .await;
        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                tracing::error!(underlying = %underlying, error = %e, "Decision evaluation failed");
                DecisionResult::error(ENGINE_STRATEGY, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(underlying = %underlying, error = %message, "Decision evaluation panicked");
                DecisionResult::error(ENGINE_STRATEGY, message)
            }
        };

        metrics::record_decision(decision.action.as_str(), &decision.strategy, started.elapsed());
        tracing::info!(
            decision_id = %decision.decision_id,
            underlying = %underlying,
            action = decision.action.as_str(),
            strategy = %decision.strategy,
            reason = decision.reason.as_deref().unwrap_or(""),
            "Decision"
        );

        *self.latest.write() = Some(Arc::new(LatestDecision {
            decision: decision.clone(),
            last_updated: now,
        }));
        decision
    }

    /// Decide from the stored chain, falling back to the last-good copy.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError`] when no usable snapshot exists.
    pub async fn decide_from_snapshot(
        &self,
        underlying: &str,
        expiry: &str,
    ) -> Result<DecisionResult, DecisionError> {
        let key = ChainKey::new(underlying, expiry);
        let snapshot = self.load_snapshot(&key).await?;
        let request = DecideRequest::from_snapshot(&snapshot)
            .ok_or_else(|| DecisionError::MissingSpot(key.to_string()))?;
        Ok(self.decide(request).await)
    }

    /// Current snapshot, else last good.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::SnapshotNotFound`] when neither exists.
    pub async fn load_snapshot(&self, key: &ChainKey) -> Result<OptionChainSnapshot, DecisionError> {
        let store = self.store.as_ref();
        if let Some(snapshot) = get_json(store, &key.current_key()).await? {
            return Ok(snapshot);
        }
        tracing::debug!(chain = %key, "Current snapshot missing, using last good");
        get_json(store, &key.last_good_key())
            .await?
            .ok_or_else(|| DecisionError::SnapshotNotFound(key.to_string()))
    }

    /// Latest decision, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<LatestDecision>> {
        self.latest.read().clone()
    }

    /// Dashboard view of the latest decision.
    #[must_use]
    pub fn dashboard_state(&self) -> DashboardState {
        match self.latest() {
            None => DashboardState::Init {
                state: "INIT",
                last_updated: None,
            },
            Some(latest) => DashboardState::Decided {
                strategy: latest.decision.strategy.clone(),
                action: latest.decision.action.as_str(),
                reason: latest.decision.reason.clone(),
                decision_id: latest.decision.decision_id.clone(),
                last_updated: latest.last_updated,
            },
        }
    }

    async fn evaluate(
        &self,
        request: &DecideRequest,
        now: DateTime<Utc>,
    ) -> Result<DecisionResult, DecisionError> {
        let ctx = self.filter_context(now).await?;
        let verdict = self.filters.evaluate(&ctx);
        if !verdict.allowed {
            let reason = verdict.reason.unwrap_or_default();
            return Ok(DecisionResult::no_trade(reasons::FILTER_STRATEGY, reason, None));
        }

        if !request.has_valid_spot() {
            return Ok(DecisionResult::no_trade(
                ENGINE_STRATEGY,
                reasons::INVALID_INPUT,
                None,
            ));
        }

        let kind = self.router.route(request);
        let monthly_loss = get_number(self.store.as_ref(), keys::LOSS_MONTH).await?;
        let eval_ctx = EvaluationContext {
            table: &self.table,
            guard: &self.guard,
            monthly_loss,
        };

        Ok(match evaluate(kind, request, &eval_ctx) {
            Ok(payload) => DecisionResult::trade(kind.as_str(), payload),
            Err(rejection) => DecisionResult::no_trade(
                kind.as_str(),
                rejection.reason,
                rejection.payload,
            ),
        })
    }

    async fn filter_context(&self, now: DateTime<Utc>) -> Result<FilterContext, DecisionError> {
        let store = self.store.as_ref();
        let heartbeat = match store.get(keys::LIVE_LAST_PACKET_TS).await {
            Ok(None) => FeedHeartbeat::Missing,
            Ok(Some(raw)) => parse_heartbeat(&raw),
            Err(e) => FeedHeartbeat::Unreadable(e.to_string()),
        };
        let pnl_today = get_number(store, keys::PNL_TODAY).await?;
        let trades = get_number(store, keys::TRADES_TODAY).await?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let trades_today = trades.max(0.0).min(f64::from(u32::MAX)) as u32;

        Ok(FilterContext {
            now,
            heartbeat,
            pnl_today,
            trades_today,
        })
    }
}

impl std::fmt::Debug for DecisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionService")
            .field("filters", &self.filters)
            .field("underlyings", &self.table.underlyings())
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

fn parse_heartbeat(raw: &str) -> FeedHeartbeat {
    parse_heartbeat_millis(raw).map_or_else(
        || FeedHeartbeat::Unreadable(format!("invalid heartbeat '{raw}'")),
        FeedHeartbeat::At,
    )
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "decision evaluation panicked".to_string())
}
