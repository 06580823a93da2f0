//! Options pricing.
//!
//! - Black-Scholes-Merton price and Greeks with continuous dividend yield
//! - Bisection implied volatility solver
//! - Expiry parsing and time-to-expiry in years

mod black_scholes;
mod expiry;
mod iv;

pub use black_scholes::{
    DAYS_PER_YEAR, GreeksResult, PricingInputs, ThetaConvention, greeks, norm_cdf, norm_pdf,
    price,
};
pub use expiry::{InvalidExpiry, SECONDS_PER_YEAR, parse_expiry, years_to_expiry};
pub use iv::{IvError, IvSolution, IvSolver, IvSolverConfig};
