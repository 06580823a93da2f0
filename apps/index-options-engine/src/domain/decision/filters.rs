//! Pre-trade filter pipeline.
//!
//! Filters run in order and the first rejection wins:
//!
//! 1. Feed freshness
//! 2. Trading window
//! 3. Daily loss cap
//! 4. Trade-count cap

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::FilterResult;
use super::reasons;

// =============================================================================
// Context
// =============================================================================

/// State of the feed heartbeat as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedHeartbeat {
    /// No heartbeat recorded.
    Missing,
    /// Last packet time in epoch milliseconds.
    At(i64),
    /// Heartbeat present but unreadable.
    Unreadable(String),
}

/// Inputs consulted by the filters.
#[derive(Debug, Clone)]
pub struct FilterContext {
    /// Evaluation time.
    pub now: DateTime<Utc>,
    /// Feed heartbeat.
    pub heartbeat: FeedHeartbeat,
    /// Realized P&L for the day (negative is a loss).
    pub pnl_today: f64,
    /// Trades already taken today.
    pub trades_today: u32,
}

/// Filter thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Maximum heartbeat age.
    pub max_feed_age: Duration,
    /// Window open (exchange local time, inclusive).
    pub window_start: NaiveTime,
    /// Window close (exchange local time, inclusive).
    pub window_end: NaiveTime,
    /// Exchange offset from UTC in minutes.
    pub utc_offset_minutes: i32,
    /// Daily loss cap as a positive amount.
    pub max_daily_loss: f64,
    /// Trade cap per day.
    pub max_trades_per_day: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_feed_age: Duration::from_secs(3),
            window_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            window_end: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: 330,
            max_daily_loss: 1000.0,
            max_trades_per_day: 2,
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// A single pre-trade check.
pub trait Filter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluate against `ctx`.
    fn check(&self, ctx: &FilterContext) -> FilterResult;
}

/// Rejects when the feed heartbeat is missing or old.
#[derive(Debug, Clone)]
pub struct FreshnessFilter {
    max_age: Duration,
}

impl Filter for FreshnessFilter {
    fn name(&self) -> &'static str {
        "freshness"
    }

    fn check(&self, ctx: &FilterContext) -> FilterResult {
        match &ctx.heartbeat {
            FeedHeartbeat::Missing => FilterResult::reject(reasons::NO_LIVE_FEED_TIMESTAMP),
            FeedHeartbeat::Unreadable(_) => FilterResult::reject(reasons::LIVE_FEED_CHECK_FAILED),
            FeedHeartbeat::At(last) => {
                let age_ms = ctx.now.timestamp_millis().saturating_sub(*last);
                let max_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
                if age_ms > max_ms {
                    FilterResult::reject(reasons::STALE_LIVE_FEED)
                } else {
                    FilterResult::allow()
                }
            }
        }
    }
}

/// Rejects outside the trading window.
#[derive(Debug, Clone)]
pub struct TradingWindowFilter {
    start: NaiveTime,
    end: NaiveTime,
    utc_offset_minutes: i32,
}

impl TradingWindowFilter {
    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        (now + chrono::Duration::minutes(i64::from(self.utc_offset_minutes))).time()
    }
}

impl Filter for TradingWindowFilter {
    fn name(&self) -> &'static str {
        "trading_window"
    }

    fn check(&self, ctx: &FilterContext) -> FilterResult {
        let local = self.local_time(ctx.now);
        if local < self.start {
            FilterResult::reject(reasons::before_window(self.start))
        } else if local > self.end {
            FilterResult::reject(reasons::after_window(self.end))
        } else {
            FilterResult::allow()
        }
    }
}

/// Rejects once the day's realized loss reaches the cap.
#[derive(Debug, Clone)]
pub struct DailyLossFilter {
    max_daily_loss: f64,
}

impl Filter for DailyLossFilter {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn check(&self, ctx: &FilterContext) -> FilterResult {
        if ctx.pnl_today <= -self.max_daily_loss {
            FilterResult::reject(reasons::DAILY_LOSS_LIMIT_REACHED)
        } else {
            FilterResult::allow()
        }
    }
}

/// Rejects once the day's trade count reaches the cap.
#[derive(Debug, Clone)]
pub struct TradeCountFilter {
    max_trades: u32,
}

impl Filter for TradeCountFilter {
    fn name(&self) -> &'static str {
        "trade_count"
    }

    fn check(&self, ctx: &FilterContext) -> FilterResult {
        if ctx.trades_today >= self.max_trades {
            FilterResult::reject(reasons::MAX_TRADES_REACHED)
        } else {
            FilterResult::allow()
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Ordered, short-circuiting filter sequence.
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    /// Standard four-stage pipeline.
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        Self::from_filters(vec![
            Box::new(FreshnessFilter {
                max_age: config.max_feed_age,
            }),
            Box::new(TradingWindowFilter {
                start: config.window_start,
                end: config.window_end,
                utc_offset_minutes: config.utc_offset_minutes,
            }),
            Box::new(DailyLossFilter {
                max_daily_loss: config.max_daily_loss,
            }),
            Box::new(TradeCountFilter {
                max_trades: config.max_trades_per_day,
            }),
        ])
    }

    /// Pipeline over an explicit filter list.
    #[must_use]
    pub fn from_filters(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Run the filters in order, returning the first rejection.
    #[must_use]
    pub fn evaluate(&self, ctx: &FilterContext) -> FilterResult {
        for filter in &self.filters {
            let result = filter.check(ctx);
            if !result.allowed {
                tracing::debug!(
                    filter = filter.name(),
                    reason = result.reason.as_deref().unwrap_or_default(),
                    "Filter rejected decision"
                );
                return result;
            }
        }
        FilterResult::allow()
    }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// True when no filters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}
