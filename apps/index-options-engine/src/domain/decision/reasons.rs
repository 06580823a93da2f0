//! Reason codes surfaced in `NO_TRADE` decisions.

/// Strategy label used when a filter rejects the request.
pub const FILTER_STRATEGY: &str = "FILTER";

// Filters
/// No feed heartbeat recorded.
pub const NO_LIVE_FEED_TIMESTAMP: &str = "NO_LIVE_FEED_TIMESTAMP";
/// Feed heartbeat older than the freshness threshold.
pub const STALE_LIVE_FEED: &str = "STALE_LIVE_FEED";
/// Feed heartbeat could not be read or parsed.
pub const LIVE_FEED_CHECK_FAILED: &str = "LIVE_FEED_CHECK_FAILED";
/// Running daily loss at or beyond the cap.
pub const DAILY_LOSS_LIMIT_REACHED: &str = "DAILY_LOSS_LIMIT_REACHED";
/// Trade count for the day at the cap.
pub const MAX_TRADES_REACHED: &str = "MAX_TRADES_REACHED";

// Strategies
/// Empty instrument list or non-positive spot.
pub const INVALID_INPUT: &str = "INVALID_INPUT";
/// No strategy profile for the underlying.
pub const UNSUPPORTED_UNDERLYING: &str = "UNSUPPORTED_UNDERLYING";
/// No short candidate within the distance range.
pub const NO_STRIKE_IN_RANGE: &str = "NO_STRIKE_IN_RANGE";
/// No contract at the hedge strike.
pub const NO_HEDGE_STRIKE: &str = "NO_HEDGE_STRIKE";
/// A selected leg has a non-positive price.
pub const INVALID_PREMIUM_DATA: &str = "INVALID_PREMIUM_DATA";
/// Hedge premium below the liquidity floor.
pub const ILLIQUID_HEDGE: &str = "ILLIQUID_HEDGE";
/// Net premium below the minimum.
pub const PREMIUM_TOO_LOW: &str = "PREMIUM_TOO_LOW";
/// Condor request missing puts or calls.
pub const MISSING_LEGS: &str = "MISSING_LEGS";
/// Condor put side has no short candidate.
pub const NO_PE_RANGE: &str = "NO_PE_RANGE";
/// Condor put side has no hedge.
pub const NO_PE_HEDGE: &str = "NO_PE_HEDGE";
/// Condor call side has no short candidate.
pub const NO_CE_RANGE: &str = "NO_CE_RANGE";
/// Condor call side has no hedge.
pub const NO_CE_HEDGE: &str = "NO_CE_HEDGE";
/// Condor max risk above its ceiling.
pub const RISK_TOO_HIGH: &str = "RISK_TOO_HIGH";

// Risk guard
/// Max risk above the per-trade cap.
pub const RISK_LIMIT_EXCEEDED: &str = "RISK_LIMIT_EXCEEDED";
/// Monthly realized loss at the cap.
pub const MONTHLY_LOSS_LIMIT_REACHED: &str = "MONTHLY_LOSS_LIMIT_REACHED";

/// `BEFORE_HHMM` for a time before the trading window opens.
#[must_use]
pub fn before_window(start: chrono::NaiveTime) -> String {
    format!("BEFORE_{}", start.format("%H%M"))
}

/// `AFTER_HHMM` for a time after the trading window closes.
#[must_use]
pub fn after_window(end: chrono::NaiveTime) -> String {
    format!("AFTER_{}", end.format("%H%M"))
}
