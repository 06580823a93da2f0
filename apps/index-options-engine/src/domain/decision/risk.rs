//! Final risk gate before a trade proposal is returned.

use serde::{Deserialize, Serialize};

use super::reasons;

/// Per-trade and monthly loss limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskGuard {
    /// Maximum worst-case loss for one trade.
    pub max_risk_per_trade: f64,
    /// Monthly realized loss at which trading stops.
    pub monthly_loss_limit: f64,
}

impl Default for RiskGuard {
    fn default() -> Self {
        Self {
            max_risk_per_trade: 1750.0,
            monthly_loss_limit: 5000.0,
        }
    }
}

impl RiskGuard {
    /// Check a proposal's max risk against the limits.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when a limit is breached.
    pub fn check(&self, max_risk: f64, monthly_loss: f64) -> Result<(), &'static str> {
        if max_risk > self.max_risk_per_trade {
            return Err(reasons::RISK_LIMIT_EXCEEDED);
        }
        if monthly_loss >= self.monthly_loss_limit {
            return Err(reasons::MONTHLY_LOSS_LIMIT_REACHED);
        }
        Ok(())
    }
}
