//! Per-underlying strategy profiles.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::instrument::OptionType;

/// Credit spread parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSpreadParams {
    /// Side sold: `PE` or `CE`.
    #[serde(default = "default_side")]
    pub side: OptionType,
    /// Minimum short distance from spot.
    pub min_distance: f64,
    /// Maximum short distance from spot.
    pub max_distance: f64,
    /// Distance between short and hedge strikes.
    pub hedge_gap: f64,
    /// Minimum net premium per unit.
    pub min_net_premium: f64,
    /// Estimated round-trip transaction cost.
    pub estimated_cost: f64,
    /// Minimum hedge premium.
    #[serde(default = "default_hedge_floor")]
    pub hedge_min_premium: f64,
}

const fn default_side() -> OptionType {
    OptionType::Put
}

const fn default_hedge_floor() -> f64 {
    5.0
}

/// Iron condor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IronCondorParams {
    /// Minimum short distance from spot (both sides).
    pub min_distance: f64,
    /// Maximum short distance from spot (both sides).
    pub max_distance: f64,
    /// Distance between short and hedge strikes.
    pub hedge_gap: f64,
    /// Minimum net premium per unit.
    pub min_net_premium: f64,
    /// Estimated round-trip transaction cost.
    pub estimated_cost: f64,
    /// Absolute max-risk ceiling checked before the risk guard.
    pub max_risk: f64,
}

/// Monthly-expiry overrides for the credit spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyOverrides {
    /// Minimum short distance.
    pub min_distance: f64,
    /// Maximum short distance.
    pub max_distance: f64,
    /// Estimated round-trip transaction cost.
    pub estimated_cost: f64,
}

/// Strategy configuration for one underlying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    /// Contract multiplier.
    pub lot_size: f64,
    /// Credit spread parameters.
    pub credit_spread: CreditSpreadParams,
    /// Iron condor parameters.
    pub iron_condor: IronCondorParams,
    /// Monthly credit spread overrides.
    #[serde(default)]
    pub monthly: Option<MonthlyOverrides>,
}

impl StrategyProfile {
    /// Credit spread parameters with monthly overrides applied when `monthly`.
    #[must_use]
    pub fn credit_spread_for(&self, monthly: bool) -> CreditSpreadParams {
        match (&self.monthly, monthly) {
            (Some(overrides), true) => CreditSpreadParams {
                min_distance: overrides.min_distance,
                max_distance: overrides.max_distance,
                estimated_cost: overrides.estimated_cost,
                ..self.credit_spread.clone()
            },
            _ => self.credit_spread.clone(),
        }
    }
}

/// Strategy profiles keyed by underlying symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyTable {
    profiles: HashMap<String, StrategyProfile>,
}

impl StrategyTable {
    /// Built-in NIFTY and BANKNIFTY profiles.
    #[must_use]
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "NIFTY".to_string(),
            StrategyProfile {
                lot_size: 50.0,
                credit_spread: CreditSpreadParams {
                    side: OptionType::Put,
                    min_distance: 150.0,
                    max_distance: 200.0,
                    hedge_gap: 200.0,
                    min_net_premium: 50.0,
                    estimated_cost: 250.0,
                    hedge_min_premium: default_hedge_floor(),
                },
                iron_condor: IronCondorParams {
                    min_distance: 200.0,
                    max_distance: 350.0,
                    hedge_gap: 200.0,
                    min_net_premium: 80.0,
                    estimated_cost: 200.0,
                    max_risk: 4000.0,
                },
                monthly: Some(MonthlyOverrides {
                    min_distance: 200.0,
                    max_distance: 300.0,
                    estimated_cost: 300.0,
                }),
            },
        );
        profiles.insert(
            "BANKNIFTY".to_string(),
            StrategyProfile {
                lot_size: 15.0,
                credit_spread: CreditSpreadParams {
                    side: OptionType::Put,
                    min_distance: 400.0,
                    max_distance: 600.0,
                    hedge_gap: 500.0,
                    min_net_premium: 60.0,
                    estimated_cost: 250.0,
                    hedge_min_premium: default_hedge_floor(),
                },
                iron_condor: IronCondorParams {
                    min_distance: 500.0,
                    max_distance: 800.0,
                    hedge_gap: 500.0,
                    min_net_premium: 100.0,
                    estimated_cost: 200.0,
                    max_risk: 6000.0,
                },
                monthly: Some(MonthlyOverrides {
                    min_distance: 500.0,
                    max_distance: 700.0,
                    estimated_cost: 300.0,
                }),
            },
        );
        Self { profiles }
    }

    /// Table from explicit profiles.
    #[must_use]
    pub const fn from_profiles(profiles: HashMap<String, StrategyProfile>) -> Self {
        Self { profiles }
    }

    /// Profile for `underlying`.
    #[must_use]
    pub fn get(&self, underlying: &str) -> Option<&StrategyProfile> {
        self.profiles.get(underlying)
    }

    /// Supported underlyings, sorted.
    #[must_use]
    pub fn underlyings(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// True when no profiles are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Last-Thursday-of-month heuristic: the expiry is a Thursday and the
/// following Thursday falls in another month. Unparseable dates are weekly.
#[must_use]
pub fn is_monthly_expiry(expiry: &str) -> bool {
    let Ok(date) = NaiveDate::parse_from_str(expiry.trim(), "%Y-%m-%d") else {
        return false;
    };
    date.weekday() == Weekday::Thu && (date + Duration::days(7)).month() != date.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("2025-01-30", true ; "last thursday of january")]
    #[test_case("2025-01-23", false ; "weekly thursday")]
    #[test_case("2025-01-31", false ; "friday at month end")]
    #[test_case("2024-02-29", true ; "leap day thursday")]
    #[test_case("bogus", false ; "unparseable")]
    fn monthly_detection(expiry: &str, expected: bool) {
        assert_eq!(is_monthly_expiry(expiry), expected);
    }

    #[test]
    fn monthly_overrides_tighten_credit_spread() {
        let table = StrategyTable::builtin();
        let nifty = table.get("NIFTY").unwrap();
        let weekly = nifty.credit_spread_for(false);
        let monthly = nifty.credit_spread_for(true);
        assert!((weekly.max_distance - 200.0).abs() < f64::EPSILON);
        assert!((monthly.min_distance - 200.0).abs() < f64::EPSILON);
        assert!((monthly.max_distance - 300.0).abs() < f64::EPSILON);
        assert!((monthly.estimated_cost - 300.0).abs() < f64::EPSILON);
        assert!((monthly.hedge_gap - weekly.hedge_gap).abs() < f64::EPSILON);
    }

    #[test]
    fn builtin_table_covers_both_indices() {
        let table = StrategyTable::builtin();
        assert_eq!(table.underlyings(), vec!["BANKNIFTY", "NIFTY"]);
        assert!((table.get("BANKNIFTY").unwrap().lot_size - 15.0).abs() < f64::EPSILON);
        assert!(table.get("FINNIFTY").is_none());
    }

    #[test]
    fn table_deserializes_with_defaults() {
        let json = r#"{
            "NIFTY": {
                "lot_size": 75,
                "credit_spread": {"min_distance": 150, "max_distance": 250,
                    "hedge_gap": 200, "min_net_premium": 35, "estimated_cost": 120},
                "iron_condor": {"min_distance": 200, "max_distance": 350, "hedge_gap": 200,
                    "min_net_premium": 80, "estimated_cost": 200, "max_risk": 4000}
            }
        }"#;
        let table: StrategyTable = serde_json::from_str(json).unwrap();
        let nifty = table.get("NIFTY").unwrap();
        assert_eq!(nifty.credit_spread.side, OptionType::Put);
        assert!((nifty.credit_spread.hedge_min_premium - 5.0).abs() < f64::EPSILON);
        assert!(nifty.monthly.is_none());
        assert_eq!(nifty.credit_spread_for(true), nifty.credit_spread);
    }
}
