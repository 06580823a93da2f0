//! Implied Volatility Solver
//!
//! Bisection on σ. The upper bound starts at 500% and is doubled while the
//! model price at the bound is still below the market price. Hitting the
//! iteration cap returns the midpoint flagged as approximate instead of
//! failing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::black_scholes::{PricingInputs, price};

/// Errors from IV computation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IvError {
    /// Market price is not a positive finite number.
    #[error("invalid market price: {0}")]
    InvalidPrice(f64),

    /// Market price is above the model price at the widest bracket.
    #[error("vol out of bounds: price {market_price:.4} exceeds model price at sigma={upper_bound}")]
    VolOutOfBounds {
        /// Observed price.
        market_price: f64,
        /// Widest bracket tried.
        upper_bound: f64,
    },
}

/// Solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvSolverConfig {
    /// Lower σ bound.
    pub min_vol: f64,
    /// Initial upper σ bound.
    pub max_vol: f64,
    /// Number of times the upper bound may be doubled.
    pub max_doublings: u32,
    /// Absolute price tolerance.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: u32,
}

impl Default for IvSolverConfig {
    fn default() -> Self {
        Self {
            min_vol: 1e-6,
            max_vol: 5.0,
            max_doublings: 10,
            tolerance: 1e-6,
            max_iterations: 60,
        }
    }
}

/// Result of an IV solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvSolution {
    /// Implied volatility.
    pub vol: f64,
    /// Bisection steps taken.
    pub iterations: u32,
    /// True when the iteration cap was hit before the tolerance.
    pub approximate: bool,
}

/// Implied volatility solver.
#[derive(Debug, Clone, Default)]
pub struct IvSolver {
    config: IvSolverConfig,
}

impl IvSolver {
    /// Create a solver.
    #[must_use]
    pub const fn new(config: IvSolverConfig) -> Self {
        Self { config }
    }

    /// Solve for the volatility that reproduces `market_price`.
    ///
    /// # Errors
    ///
    /// Returns [`IvError::InvalidPrice`] for non-positive prices and
    /// [`IvError::VolOutOfBounds`] when no bracket up to the doubling limit
    /// contains the price.
    pub fn solve(&self, market_price: f64, inputs: &PricingInputs) -> Result<IvSolution, IvError> {
        if !market_price.is_finite() || market_price <= 0.0 {
            return Err(IvError::InvalidPrice(market_price));
        }

        let mut low = self.config.min_vol;
        let mut high = self.config.max_vol;
        let mut doublings = 0;
        while price(inputs, high) < market_price {
            if doublings >= self.config.max_doublings {
                return Err(IvError::VolOutOfBounds {
                    market_price,
                    upper_bound: high,
                });
            }
            high *= 2.0;
            doublings += 1;
        }

        let mut mid = low.midpoint(high);
        for iteration in 1..=self.config.max_iterations {
            mid = low.midpoint(high);
            let model = price(inputs, mid);
            if (model - market_price).abs() < self.config.tolerance {
                return Ok(IvSolution {
                    vol: mid,
                    iterations: iteration,
                    approximate: false,
                });
            }
            if model < market_price {
                low = mid;
            } else {
                high = mid;
            }
        }

        Ok(IvSolution {
            vol: mid,
            iterations: self.config.max_iterations,
            approximate: true,
        })
    }
}
