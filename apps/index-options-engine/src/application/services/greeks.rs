//! Greeks Service
//!
//! Prices single contracts, batches and chain windows with a shared TTL
//! cache. Concurrent misses for the same key may both compute and write;
//! the later write wins and is counted as duplicate work.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chain::{OptionChainSnapshot, nearest_strike};
use crate::domain::instrument::OptionType;
use crate::domain::pricing::{
    InvalidExpiry, IvError, IvSolver, PricingInputs, greeks, years_to_expiry,
};
use crate::infrastructure::config::GreeksSettings;
use crate::infrastructure::metrics::{self, CacheOutcome};

// =============================================================================
// Request / Response
// =============================================================================

/// Greeks request for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreeksRequest {
    /// Contract or underlying symbol.
    pub symbol: String,
    /// Underlying price.
    pub underlying: f64,
    /// Strike.
    pub strike: f64,
    /// Expiry (`YYYY-MM-DD` or ISO-8601).
    pub expiry: String,
    /// Call or put.
    pub option_type: OptionType,
    /// Annualized volatility; takes precedence over `option_price`.
    #[serde(default)]
    pub iv: Option<f64>,
    /// Market price to invert when `iv` is absent.
    #[serde(default)]
    pub option_price: Option<f64>,
    /// Risk-free rate.
    #[serde(default)]
    pub r: Option<f64>,
    /// Dividend yield.
    #[serde(default)]
    pub q: Option<f64>,
}

impl GreeksRequest {
    fn cache_key(&self) -> String {
        #[allow(clippy::cast_possible_truncation)]
        let (strike, underlying) = (self.strike.trunc() as i64, self.underlying.round() as i64);
        format!(
            "greeks:{}:{}:{}:{strike}:{underlying}",
            self.symbol,
            self.expiry.trim(),
            self.option_type
        )
    }
}

/// Priced contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreeksResponse {
    /// Symbol from the request.
    pub symbol: String,
    /// Strike.
    pub strike: f64,
    /// Expiry.
    pub expiry: String,
    /// Call or put.
    pub option_type: OptionType,
    /// Underlying price used.
    pub underlying: f64,
    /// Volatility used (given or implied; zero once expired).
    pub implied_vol: f64,
    /// True when the IV solve stopped at its iteration cap.
    pub iv_approximate: bool,
    /// Model price.
    pub theoretical_price: f64,
    /// Delta.
    pub delta: f64,
    /// Gamma.
    pub gamma: f64,
    /// Vega.
    pub vega: f64,
    /// Theta.
    pub theta: f64,
    /// Rho.
    pub rho: f64,
    /// d1.
    pub d1: Option<f64>,
    /// d2.
    pub d2: Option<f64>,
    /// Computation time (epoch seconds).
    pub timestamp: f64,
}

/// Per-item failure inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    /// Error text.
    pub error: String,
    /// Symbol from the request.
    pub symbol: String,
    /// Strike from the request.
    pub strike: f64,
    /// Expiry from the request.
    pub expiry: String,
}

/// One entry of a batch response, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    /// Priced.
    Ok(Box<GreeksResponse>),
    /// Failed.
    Err(BatchItemError),
}

/// Batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Number of results.
    pub count: usize,
    /// Results parallel to the request list.
    pub results: Vec<BatchItem>,
}

/// Greeks for a window of strikes around ATM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainGreeks {
    /// Underlying.
    pub underlying: String,
    /// Expiry.
    pub expiry: String,
    /// Spot used.
    pub spot: f64,
    /// ATM strike.
    pub atm: i64,
    /// Strikes priced.
    pub strikes: Vec<i64>,
    /// Number of results.
    pub count: usize,
    /// Results by strike then CE before PE.
    pub results: Vec<BatchItem>,
}

/// Pricing failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GreeksError {
    /// Expiry could not be parsed.
    #[error(transparent)]
    InvalidExpiry(#[from] InvalidExpiry),

    /// Neither a volatility nor a price was supplied.
    #[error("Either iv or option_price must be provided")]
    MissingVolatility,

    /// IV inversion failed.
    #[error("implied vol solve failed: {0}")]
    ImpliedVol(#[from] IvError),

    /// Spot, strike or volatility out of domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chain has no spot to price against.
    #[error("chain {0} has no underlying price")]
    MissingSpot(String),

    /// Chain has no strikes.
    #[error("chain {0} has no strikes")]
    EmptyChain(String),
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
struct CachedGreeks {
    response: GreeksResponse,
    expires_at: Instant,
}

/// Greeks engine with a TTL cache.
#[derive(Debug)]
pub struct GreeksService {
    settings: GreeksSettings,
    solver: IvSolver,
    cache: RwLock<HashMap<String, CachedGreeks>>,
}

impl GreeksService {
    /// Create a service.
    #[must_use]
    pub fn new(settings: GreeksSettings) -> Self {
        Self {
            settings,
            solver: IvSolver::default(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Default strike window for chain computes.
    #[must_use]
    pub const fn chain_window(&self) -> usize {
        self.settings.chain_window
    }

    /// Price one contract, serving from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`GreeksError`] if the request cannot be priced.
    pub fn compute(&self, request: &GreeksRequest) -> Result<GreeksResponse, GreeksError> {
        self.compute_at(request, Utc::now())
    }

    /// [`Self::compute`] at an explicit time.
    ///
    /// # Errors
    ///
    /// Returns [`GreeksError`] if the request cannot be priced.
    pub fn compute_at(
        &self,
        request: &GreeksRequest,
        now: DateTime<Utc>,
    ) -> Result<GreeksResponse, GreeksError> {
        let key = request.cache_key();
        if let Some(hit) = self.cached(&key) {
            metrics::record_greeks_cache(CacheOutcome::Hit);
            return Ok(hit);
        }
        metrics::record_greeks_cache(CacheOutcome::Miss);

        let response = self.price(request, now)?;
        self.store(key, response.clone());
        Ok(response)
    }

    /// Price a list, keeping order; failures become per-item errors.
    #[must_use]
    pub fn compute_batch(&self, requests: &[GreeksRequest]) -> BatchResponse {
        self.compute_batch_at(requests, Utc::now())
    }

    /// [`Self::compute_batch`] at an explicit time.
    #[must_use]
    pub fn compute_batch_at(&self, requests: &[GreeksRequest], now: DateTime<Utc>) -> BatchResponse {
        let results: Vec<BatchItem> = requests
            .iter()
            .map(|request| match self.compute_at(request, now) {
                Ok(response) => BatchItem::Ok(Box::new(response)),
                Err(e) => BatchItem::Err(BatchItemError {
                    error: e.to_string(),
                    symbol: request.symbol.clone(),
                    strike: request.strike,
                    expiry: request.expiry.clone(),
                }),
            })
            .collect();
        BatchResponse {
            count: results.len(),
            results,
        }
    }

    /// Price the legs within `window` strikes of ATM, inverting IV from
    /// each leg's last price. Legs without a positive price are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GreeksError::MissingSpot`] or [`GreeksError::EmptyChain`]
    /// when the chain cannot be centred.
    pub fn compute_chain(
        &self,
        snapshot: &OptionChainSnapshot,
        window: usize,
    ) -> Result<ChainGreeks, GreeksError> {
        self.compute_chain_at(snapshot, window, Utc::now())
    }

    /// [`Self::compute_chain`] at an explicit time.
    ///
    /// # Errors
    ///
    /// See [`Self::compute_chain`].
    pub fn compute_chain_at(
        &self,
        snapshot: &OptionChainSnapshot,
        window: usize,
        now: DateTime<Utc>,
    ) -> Result<ChainGreeks, GreeksError> {
        let label = snapshot.key().to_string();
        let spot = snapshot
            .spot
            .ok_or_else(|| GreeksError::MissingSpot(label.clone()))?;
        let strikes: Vec<i64> = snapshot.strikes.keys().copied().collect();
        let atm = snapshot
            .atm
            .filter(|atm| snapshot.strikes.contains_key(atm))
            .or_else(|| nearest_strike(strikes.iter().copied(), spot))
            .ok_or(GreeksError::EmptyChain(label))?;

        let centre = strikes.binary_search(&atm).unwrap_or_else(|i| i);
        let start = centre.saturating_sub(window);
        let end = centre
            .saturating_add(window)
            .saturating_add(1)
            .min(strikes.len());
        let chosen = strikes[start..end].to_vec();

        let requests: Vec<GreeksRequest> = chosen
            .iter()
            .filter_map(|strike| snapshot.strikes.get(strike).map(|legs| (strike, legs)))
            .flat_map(|(strike, legs)| {
                [OptionType::Call, OptionType::Put]
                    .into_iter()
                    .filter_map(move |option_type| {
                        legs.leg(option_type)
                            .filter(|leg| leg.last_price > 0.0)
                            .map(|leg| (*strike, option_type, leg.last_price))
                    })
            })
            .map(|(strike, option_type, last_price)| {
                #[allow(clippy::cast_precision_loss)]
                let strike = strike as f64;
                GreeksRequest {
                    symbol: snapshot.underlying.clone(),
                    underlying: spot,
                    strike,
                    expiry: snapshot.expiry.clone(),
                    option_type,
                    iv: None,
                    option_price: Some(last_price),
                    r: None,
                    q: None,
                }
            })
            .collect();

        let batch = self.compute_batch_at(&requests, now);
        Ok(ChainGreeks {
            underlying: snapshot.underlying.clone(),
            expiry: snapshot.expiry.clone(),
            spot,
            atm,
            strikes: chosen,
            count: batch.count,
            results: batch.results,
        })
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.cache.write().retain(|_, entry| entry.expires_at > now);
    }

    /// Cached entry count, expired included.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    fn cached(&self, key: &str) -> Option<GreeksResponse> {
        self.cache
            .read()
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.response.clone())
    }

    fn store(&self, key: String, response: GreeksResponse) {
        let now = Instant::now();
        let entry = CachedGreeks {
            response,
            expires_at: now + self.settings.cache_ttl,
        };
        let previous = self.cache.write().insert(key, entry);
        if previous.is_some_and(|p| p.expires_at > now) {
            metrics::record_greeks_duplicate_write();
        }
    }

    fn price(&self, request: &GreeksRequest, now: DateTime<Utc>) -> Result<GreeksResponse, GreeksError> {
        if !(request.underlying.is_finite() && request.underlying > 0.0) {
            return Err(GreeksError::InvalidInput(format!(
                "underlying must be positive, got {}",
                request.underlying
            )));
        }
        if !(request.strike.is_finite() && request.strike > 0.0) {
            return Err(GreeksError::InvalidInput(format!(
                "strike must be positive, got {}",
                request.strike
            )));
        }

        let inputs = PricingInputs {
            spot: request.underlying,
            strike: request.strike,
            time_years: years_to_expiry(&request.expiry, now)?,
            rate: request.r.unwrap_or(self.settings.risk_free_rate),
            dividend_yield: request.q.unwrap_or(self.settings.dividend_yield),
            option_type: request.option_type,
        };

        let (sigma, approximate) = if inputs.time_years <= 0.0 {
            (0.0, false)
        } else if let Some(iv) = request.iv {
            if !(iv.is_finite() && iv > 0.0) {
                return Err(GreeksError::InvalidInput(format!("iv must be positive, got {iv}")));
            }
            (iv, false)
        } else {
            let market_price = request.option_price.ok_or(GreeksError::MissingVolatility)?;
            let solution = self.solver.solve(market_price, &inputs)?;
            if solution.approximate {
                metrics::record_iv_approximate();
                tracing::debug!(
                    symbol = %request.symbol,
                    strike = request.strike,
                    iterations = solution.iterations,
                    "IV solve hit iteration cap"
                );
            }
            (solution.vol, solution.approximate)
        };

        let result = greeks(&inputs, sigma, self.settings.theta);
        #[allow(clippy::cast_precision_loss)]
        let timestamp = now.timestamp_millis() as f64 / 1000.0;

        Ok(GreeksResponse {
            symbol: request.symbol.clone(),
            strike: request.strike,
            expiry: request.expiry.clone(),
            option_type: request.option_type,
            underlying: request.underlying,
            implied_vol: result.implied_vol,
            iv_approximate: approximate,
            theoretical_price: result.theoretical_price,
            delta: result.delta,
            gamma: result.gamma,
            vega: result.vega,
            theta: result.theta,
            rho: result.rho,
            d1: result.d1,
            d2: result.d2,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{OptionLeg, StrikeLegs};
    use crate::domain::pricing::price;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn service() -> GreeksService {
        GreeksService::new(GreeksSettings::default())
    }

    fn request(option_type: OptionType) -> GreeksRequest {
        GreeksRequest {
            symbol: "NIFTY".to_string(),
            underlying: 24_000.0,
            strike: 24_000.0,
            expiry: "2025-01-31".to_string(),
            option_type,
            iv: Some(0.15),
            option_price: None,
            r: None,
            q: None,
        }
    }

    #[test]
    fn given_iv_prices_directly() {
        let svc = service();
        let out = svc.compute_at(&request(OptionType::Call), now()).unwrap();
        assert!(approx_eq(out.implied_vol, 0.15, 1e-12));
        assert!(out.theoretical_price > 0.0);
        assert!(out.delta > 0.5 && out.delta < 0.6);
        assert!(!out.iv_approximate);
    }

    #[test]
    fn option_price_is_inverted() {
        let svc = service();
        let base = request(OptionType::Put);
        let inputs = PricingInputs {
            spot: 24_000.0,
            strike: 24_000.0,
            time_years: years_to_expiry("2025-01-31", now()).unwrap(),
            rate: 0.06,
            dividend_yield: 0.0,
            option_type: OptionType::Put,
        };
        let market = price(&inputs, 0.2);
        let out = svc
            .compute_at(
                &GreeksRequest {
                    iv: None,
                    option_price: Some(market),
                    ..base
                },
                now(),
            )
            .unwrap();
        assert!(approx_eq(out.implied_vol, 0.2, 1e-4));
    }

    #[test]
    fn missing_volatility_is_an_error() {
        let svc = service();
        let err = svc
            .compute_at(
                &GreeksRequest {
                    iv: None,
                    ..request(OptionType::Call)
                },
                now(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Either iv or option_price must be provided");
    }

    #[test]
    fn expired_contract_returns_intrinsic() {
        let svc = service();
        let out = svc
            .compute_at(
                &GreeksRequest {
                    strike: 23_900.0,
                    expiry: "2024-12-26".to_string(),
                    iv: None,
                    ..request(OptionType::Call)
                },
                now(),
            )
            .unwrap();
        assert!(approx_eq(out.theoretical_price, 100.0, 1e-9));
        assert!(approx_eq(out.delta, 1.0, 1e-12));
        assert!(approx_eq(out.implied_vol, 0.0, 1e-12));
        assert!(out.d1.is_none());
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let svc = service();
        let first = svc.compute_at(&request(OptionType::Call), now()).unwrap();
        let later = now() + chrono::Duration::days(1);
        let second = svc.compute_at(&request(OptionType::Call), later).unwrap();
        assert_eq!(first, second);
        assert_eq!(svc.cache_len(), 1);
    }

    #[test]
    fn expired_cache_entries_recompute() {
        let svc = GreeksService::new(GreeksSettings {
            cache_ttl: Duration::ZERO,
            ..GreeksSettings::default()
        });
        let first = svc.compute_at(&request(OptionType::Call), now()).unwrap();
        let later = now() + chrono::Duration::days(1);
        let second = svc.compute_at(&request(OptionType::Call), later).unwrap();
        assert!(second.theoretical_price < first.theoretical_price);
        svc.purge_expired();
        assert_eq!(svc.cache_len(), 0);
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let svc = service();
        let bad = GreeksRequest {
            expiry: "soon".to_string(),
            ..request(OptionType::Call)
        };
        let out = svc.compute_batch_at(
            &[request(OptionType::Call), bad, request(OptionType::Put)],
            now(),
        );
        assert_eq!(out.count, 3);
        assert!(matches!(&out.results[0], BatchItem::Ok(r) if r.option_type == OptionType::Call));
        assert!(matches!(&out.results[1], BatchItem::Err(e) if e.expiry == "soon"));
        assert!(matches!(&out.results[2], BatchItem::Ok(r) if r.option_type == OptionType::Put));

        let json = serde_json::to_value(&out).unwrap();
        assert!(json["results"][1]["error"].as_str().unwrap().contains("soon"));
    }

    fn leg(price: f64) -> Option<OptionLeg> {
        Some(OptionLeg {
            last_price: price,
            open_interest: 100,
            volume: 10,
        })
    }

    fn chain(spot: Option<f64>) -> OptionChainSnapshot {
        let mut strikes = BTreeMap::new();
        for (i, strike) in (23_800..=24_200).step_by(50).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f64;
            strikes.insert(
                strike,
                StrikeLegs {
                    call: leg(250.0 - offset * 20.0),
                    put: if strike == 24_000 { leg(0.0) } else { leg(50.0 + offset * 20.0) },
                },
            );
        }
        OptionChainSnapshot {
            underlying: "NIFTY".to_string(),
            expiry: "2025-01-31".to_string(),
            timestamp: 1,
            spot,
            atm: Some(24_000),
            strikes,
        }
    }

    #[test]
    fn chain_window_centres_on_atm() {
        let svc = service();
        let out = svc.compute_chain_at(&chain(Some(24_010.0)), 1, now()).unwrap();
        assert_eq!(out.atm, 24_000);
        assert_eq!(out.strikes, vec![23_950, 24_000, 24_050]);
        // zero-priced ATM put is skipped
        assert_eq!(out.count, 5);
    }

    #[test]
    fn oversized_window_covers_whole_chain() {
        let svc = service();
        let out = svc
            .compute_chain_at(&chain(Some(24_010.0)), usize::MAX, now())
            .unwrap();
        assert_eq!(out.strikes.len(), 9);
        assert_eq!(out.strikes.first(), Some(&23_800));
        assert_eq!(out.strikes.last(), Some(&24_200));
    }

    #[test]
    fn chain_without_spot_is_rejected() {
        let svc = service();
        assert!(matches!(
            svc.compute_chain_at(&chain(None), 2, now()),
            Err(GreeksError::MissingSpot(_))
        ));
    }
}
