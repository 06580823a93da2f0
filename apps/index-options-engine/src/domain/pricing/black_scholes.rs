//! Black-Scholes-Merton valuation with continuous dividend yield.

// Black-Scholes uses standard mathematical notation (s, k, t, r, q, sigma)
// Financial formulas use standard notation where mul_add() obscures meaning
#![allow(clippy::many_single_char_names)]
#![allow(clippy::suboptimal_flops)]

use std::f64::consts::{PI, SQRT_2};

use serde::{Deserialize, Serialize};

use crate::domain::instrument::OptionType;

/// Days used to convert annual theta to per-day theta.
pub const DAYS_PER_YEAR: f64 = 365.0;

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Contract and market inputs, excluding volatility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingInputs {
    /// Underlying price.
    pub spot: f64,
    /// Strike price.
    pub strike: f64,
    /// Time to expiry in years.
    pub time_years: f64,
    /// Risk-free rate (continuous, annual).
    pub rate: f64,
    /// Dividend yield (continuous, annual).
    pub dividend_yield: f64,
    /// Call or put.
    pub option_type: OptionType,
}

/// Unit in which theta is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThetaConvention {
    /// Price change per year.
    #[default]
    Annual,
    /// Price change per calendar day (annual ÷ 365).
    PerDay,
}

impl ThetaConvention {
    /// Parse a convention name, falling back to `Annual`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_day" | "daily" | "day" => Self::PerDay,
            _ => Self::Annual,
        }
    }

    /// Convert an annualized theta into this convention.
    #[must_use]
    pub fn scale(self, annual_theta: f64) -> f64 {
        match self {
            Self::Annual => annual_theta,
            Self::PerDay => annual_theta / DAYS_PER_YEAR,
        }
    }
}

/// Price and sensitivities for one contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreeksResult {
    /// Model price.
    pub theoretical_price: f64,
    /// ∂V/∂S.
    pub delta: f64,
    /// ∂²V/∂S².
    pub gamma: f64,
    /// ∂V/∂σ (per 1.0 of volatility).
    pub vega: f64,
    /// ∂V/∂t in the requested convention.
    pub theta: f64,
    /// ∂V/∂r (per 1.0 of rate).
    pub rho: f64,
    /// Volatility used for the valuation.
    pub implied_vol: f64,
    /// d1, absent for expired or zero-volatility inputs.
    pub d1: Option<f64>,
    /// d2, absent for expired or zero-volatility inputs.
    pub d2: Option<f64>,
}

// =============================================================================
// Normal distribution
// =============================================================================

/// Standard normal CDF.
#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

/// Standard normal PDF.
#[must_use]
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

// =============================================================================
// Valuation
// =============================================================================

fn d1_d2(inputs: &PricingInputs, sigma: f64) -> (f64, f64) {
    let PricingInputs {
        spot: s,
        strike: k,
        time_years: t,
        rate: r,
        dividend_yield: q,
        ..
    } = *inputs;
    let vol_sqrt_t = sigma * t.sqrt();
    let d1 = ((s / k).ln() + (r - q + 0.5 * sigma * sigma) * t) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

fn intrinsic(inputs: &PricingInputs) -> f64 {
    match inputs.option_type {
        OptionType::Call => (inputs.spot - inputs.strike).max(0.0),
        OptionType::Put => (inputs.strike - inputs.spot).max(0.0),
    }
}

fn is_degenerate(inputs: &PricingInputs, sigma: f64) -> bool {
    inputs.time_years <= 0.0 || sigma <= 0.0
}

/// Model price at volatility `sigma`. Expired or zero-volatility inputs
/// price at intrinsic value.
#[must_use]
pub fn price(inputs: &PricingInputs, sigma: f64) -> f64 {
    if is_degenerate(inputs, sigma) {
        return intrinsic(inputs);
    }

    let (d1, d2) = d1_d2(inputs, sigma);
    let PricingInputs {
        spot: s,
        strike: k,
        time_years: t,
        rate: r,
        dividend_yield: q,
        option_type,
    } = *inputs;
    let disc_s = s * (-q * t).exp();
    let disc_k = k * (-r * t).exp();

    match option_type {
        OptionType::Call => disc_s * norm_cdf(d1) - disc_k * norm_cdf(d2),
        OptionType::Put => disc_k * norm_cdf(-d2) - disc_s * norm_cdf(-d1),
    }
}

/// Price and Greeks at volatility `sigma`.
///
/// Expired or zero-volatility inputs return intrinsic value, a step delta
/// (`1`/`0` for calls, `-1`/`0` for puts) and zero for everything else.
#[must_use]
pub fn greeks(inputs: &PricingInputs, sigma: f64, theta: ThetaConvention) -> GreeksResult {
    if is_degenerate(inputs, sigma) {
        let delta = match inputs.option_type {
            OptionType::Call if inputs.spot > inputs.strike => 1.0,
            OptionType::Put if inputs.spot < inputs.strike => -1.0,
            _ => 0.0,
        };
        return GreeksResult {
            theoretical_price: intrinsic(inputs),
            delta,
            gamma: 0.0,
            vega: 0.0,
            theta: 0.0,
            rho: 0.0,
            implied_vol: 0.0,
            d1: None,
            d2: None,
        };
    }

    let (d1, d2) = d1_d2(inputs, sigma);
    let PricingInputs {
        spot: s,
        strike: k,
        time_years: t,
        rate: r,
        dividend_yield: q,
        option_type,
    } = *inputs;
    let sqrt_t = t.sqrt();
    let div_disc = (-q * t).exp();
    let rate_disc = (-r * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let gamma = div_disc * pdf_d1 / (s * sigma * sqrt_t);
    let vega = s * div_disc * pdf_d1 * sqrt_t;
    let decay = -s * div_disc * pdf_d1 * sigma / (2.0 * sqrt_t);

    let (delta, annual_theta, rho) = match option_type {
        OptionType::Call => (
            div_disc * norm_cdf(d1),
            decay - r * k * rate_disc * norm_cdf(d2) + q * s * div_disc * norm_cdf(d1),
            k * t * rate_disc * norm_cdf(d2),
        ),
        OptionType::Put => (
            -div_disc * norm_cdf(-d1),
            decay + r * k * rate_disc * norm_cdf(-d2) - q * s * div_disc * norm_cdf(-d1),
            -k * t * rate_disc * norm_cdf(-d2),
        ),
    };

    GreeksResult {
        theoretical_price: price(inputs, sigma),
        delta,
        gamma,
        vega,
        theta: theta.scale(annual_theta),
        rho,
        implied_vol: sigma,
        d1: Some(d1),
        d2: Some(d2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    fn inputs(option_type: OptionType) -> PricingInputs {
        PricingInputs {
            spot: 100.0,
            strike: 100.0,
            time_years: 1.0,
            rate: 0.05,
            dividend_yield: 0.0,
            option_type,
        }
    }

    #[test]
    fn norm_cdf_reference_points() {
        assert!(approx_eq(norm_cdf(0.0), 0.5, 1e-9));
        assert!(approx_eq(norm_cdf(1.96), 0.975, 1e-3));
        assert!(approx_eq(norm_cdf(-1.96), 0.025, 1e-3));
    }

    #[test]
    fn reference_prices() {
        assert!(approx_eq(price(&inputs(OptionType::Call), 0.20), 10.45, 0.01));
        assert!(approx_eq(price(&inputs(OptionType::Put), 0.20), 5.57, 0.01));
    }

    #[test]
    fn expired_contract_is_intrinsic() {
        let call = PricingInputs {
            spot: 24_100.0,
            strike: 24_000.0,
            time_years: 0.0,
            ..inputs(OptionType::Call)
        };
        let g = greeks(&call, 0.15, ThetaConvention::Annual);
        assert!(approx_eq(g.theoretical_price, 100.0, 1e-9));
        assert!(approx_eq(g.delta, 1.0, 1e-12));
        assert!(g.d1.is_none());
        assert!(g.gamma.abs() < f64::EPSILON);

        let put = PricingInputs {
            option_type: OptionType::Put,
            ..call
        };
        let g = greeks(&put, 0.15, ThetaConvention::Annual);
        assert!(g.theoretical_price.abs() < f64::EPSILON);
        assert!(g.delta.abs() < f64::EPSILON);
    }

    #[test]
    fn per_day_theta_is_annual_over_365() {
        let i = inputs(OptionType::Call);
        let annual = greeks(&i, 0.2, ThetaConvention::Annual).theta;
        let daily = greeks(&i, 0.2, ThetaConvention::PerDay).theta;
        assert!(annual < 0.0);
        assert!(approx_eq(daily * 365.0, annual, 1e-9));
    }

    #[test]
    fn theta_convention_parsing() {
        assert_eq!(
            ThetaConvention::from_str_case_insensitive("PER_DAY"),
            ThetaConvention::PerDay
        );
        assert_eq!(
            ThetaConvention::from_str_case_insensitive("per-day"),
            ThetaConvention::PerDay
        );
        assert_eq!(
            ThetaConvention::from_str_case_insensitive("annual"),
            ThetaConvention::Annual
        );
    }

    proptest! {
        #[test]
        fn atm_call_equals_put_without_carry(
            spot in 10.0f64..50_000.0,
            sigma in 0.01f64..2.0,
            t in 0.01f64..3.0,
        ) {
            let call = PricingInputs {
                spot,
                strike: spot,
                time_years: t,
                rate: 0.0,
                dividend_yield: 0.0,
                option_type: OptionType::Call,
            };
            let put = PricingInputs { option_type: OptionType::Put, ..call };
            let diff = price(&call, sigma) - price(&put, sigma);
            prop_assert!(diff.abs() < spot * 1e-9, "call-put gap {diff}");
        }

        #[test]
        fn call_delta_minus_put_delta_is_one(
            spot in 10.0f64..50_000.0,
            moneyness in 0.7f64..1.3,
            sigma in 0.01f64..2.0,
            t in 0.01f64..3.0,
            r in 0.0f64..0.1,
        ) {
            let call = PricingInputs {
                spot,
                strike: spot * moneyness,
                time_years: t,
                rate: r,
                dividend_yield: 0.0,
                option_type: OptionType::Call,
            };
            let put = PricingInputs { option_type: OptionType::Put, ..call };
            let dc = greeks(&call, sigma, ThetaConvention::Annual).delta;
            let dp = greeks(&put, sigma, ThetaConvention::Annual).delta;
            prop_assert!((dc - dp - 1.0).abs() < 1e-9);
        }
    }
}
