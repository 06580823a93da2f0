//! Engine Configuration Settings
//!
//! Configuration types for the engine, loaded from environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use super::strategy::load_strategy_table;
use crate::domain::chain::DEFAULT_MIN_COMPLETE_STRIKES;
use crate::domain::decision::{FilterConfig, RiskGuard, StrategyTable};
use crate::domain::pricing::ThetaConvention;
use crate::infrastructure::dhan::{FeedMode, SubscriptionInstrument, parse_instrument_list};

/// Dhan feed credentials.
#[derive(Clone)]
pub struct DhanCredentials {
    client_id: String,
    access_token: String,
}

impl DhanCredentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, access_token: String) -> Self {
        Self {
            client_id,
            access_token,
        }
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for DhanCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhanCredentials")
            .field("client_id", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Feed base URL.
    pub url: String,
    /// Subscription mode.
    pub mode: FeedMode,
    /// Explicit subscription list; empty means derive from the instrument table.
    pub instruments: Vec<SubscriptionInstrument>,
    /// Index security id → underlying symbol, for spot updates.
    pub spot_security_ids: HashMap<u32, String>,
    /// Backoff floor.
    pub backoff_initial: Duration,
    /// Backoff cap.
    pub backoff_max: Duration,
    /// Backoff jitter fraction.
    pub backoff_jitter: f64,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Send timeout.
    pub send_timeout: Duration,
    /// Client ping cadence.
    pub ping_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "wss://api-feed.dhan.co".to_string(),
            mode: FeedMode::Full,
            instruments: Vec::new(),
            spot_security_ids: HashMap::from([
                (13, "NIFTY".to_string()),
                (25, "BANKNIFTY".to_string()),
            ]),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            backoff_jitter: 0.0,
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
        }
    }
}

impl FeedSettings {
    /// Connection URL including the auth query.
    #[must_use]
    pub fn connect_url(&self, credentials: &DhanCredentials) -> String {
        format!(
            "{}?version=2&token={}&clientId={}&authType=2",
            self.url.trim_end_matches('/'),
            credentials.access_token(),
            credentials.client_id()
        )
    }
}

/// Chain aggregation settings.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    /// Strikes with both legs required before publishing.
    pub min_complete_strikes: usize,
    /// TTL of the current snapshot key.
    pub snapshot_ttl: Duration,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            min_complete_strikes: DEFAULT_MIN_COMPLETE_STRIKES,
            snapshot_ttl: Duration::from_secs(15),
        }
    }
}

/// Greeks engine settings.
#[derive(Debug, Clone)]
pub struct GreeksSettings {
    /// Result cache TTL.
    pub cache_ttl: Duration,
    /// Default risk-free rate.
    pub risk_free_rate: f64,
    /// Default dividend yield.
    pub dividend_yield: f64,
    /// Theta units.
    pub theta: ThetaConvention,
    /// Strikes either side of ATM for chain compute.
    pub chain_window: usize,
    /// Debounce for snapshot-triggered recompute.
    pub recompute_debounce: Duration,
}

impl Default for GreeksSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            risk_free_rate: 0.06,
            dividend_yield: 0.0,
            theta: ThetaConvention::Annual,
            chain_window: 5,
            recompute_debounce: Duration::from_millis(500),
        }
    }
}

/// Decision pipeline settings.
#[derive(Debug, Clone, Default)]
pub struct DecisionSettings {
    /// Filter thresholds.
    pub filters: FilterConfig,
    /// Risk guard limits.
    pub risk: RiskGuard,
    /// Strategy profiles.
    pub strategies: StrategyTable,
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP server port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8082 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Feed credentials.
    pub credentials: DhanCredentials,
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Instrument master path.
    pub instrument_csv_path: PathBuf,
    /// Chain settings.
    pub chain: ChainSettings,
    /// Greeks settings.
    pub greeks: GreeksSettings,
    /// Decision settings.
    pub decision: DecisionSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let client_id = env.required("DHAN_CLIENT_ID")?;
        let access_token = env.required("DHAN_ACCESS_TOKEN")?;

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            url: env.string("DHAN_FEED_URL", &feed_defaults.url),
            mode: env
                .get("FEED_MODE")
                .map_or(feed_defaults.mode, |s| FeedMode::from_str_case_insensitive(&s)),
            instruments: env
                .get("INSTRUMENTS")
                .map(|s| parse_instrument_list(&s))
                .unwrap_or_default(),
            spot_security_ids: env
                .get("SPOT_SECURITY_IDS")
                .map_or(feed_defaults.spot_security_ids, |s| parse_spot_ids(&s)),
            backoff_initial: env.secs("FEED_BACKOFF_INITIAL_SECS", feed_defaults.backoff_initial),
            backoff_max: env.secs("FEED_BACKOFF_MAX_SECS", feed_defaults.backoff_max),
            backoff_jitter: env.parse("FEED_BACKOFF_JITTER", feed_defaults.backoff_jitter),
            connect_timeout: env.secs("FEED_CONNECT_TIMEOUT_SECS", feed_defaults.connect_timeout),
            send_timeout: env.secs("FEED_SEND_TIMEOUT_SECS", feed_defaults.send_timeout),
            ping_interval: env.secs("FEED_PING_INTERVAL_SECS", feed_defaults.ping_interval),
        };
        if feed.backoff_initial > feed.backoff_max {
            return Err(ConfigError::Invalid(format!(
                "FEED_BACKOFF_INITIAL_SECS ({}s) exceeds FEED_BACKOFF_MAX_SECS ({}s)",
                feed.backoff_initial.as_secs(),
                feed.backoff_max.as_secs()
            )));
        }

        let chain_defaults = ChainSettings::default();
        let chain = ChainSettings {
            min_complete_strikes: env.parse(
                "CHAIN_MIN_COMPLETE_STRIKES",
                chain_defaults.min_complete_strikes,
            ),
            snapshot_ttl: env.secs("SNAPSHOT_TTL_SECS", chain_defaults.snapshot_ttl),
        };

        let greeks_defaults = GreeksSettings::default();
        let greeks = GreeksSettings {
            cache_ttl: env.secs("GREEKS_CACHE_TTL_SECS", greeks_defaults.cache_ttl),
            risk_free_rate: env.parse("GREEKS_RISK_FREE_RATE", greeks_defaults.risk_free_rate),
            dividend_yield: env.parse("GREEKS_DIVIDEND_YIELD", greeks_defaults.dividend_yield),
            theta: env
                .get("GREEKS_THETA_CONVENTION")
                .map_or(greeks_defaults.theta, |s| {
                    ThetaConvention::from_str_case_insensitive(&s)
                }),
            chain_window: env.parse("GREEKS_CHAIN_WINDOW", greeks_defaults.chain_window),
            recompute_debounce: env.millis(
                "GREEKS_RECOMPUTE_DEBOUNCE_MS",
                greeks_defaults.recompute_debounce,
            ),
        };

        let filter_defaults = FilterConfig::default();
        let filters = FilterConfig {
            max_feed_age: env.secs("FILTER_MAX_FEED_AGE_SECS", filter_defaults.max_feed_age),
            window_start: env.time("TRADING_WINDOW_START", filter_defaults.window_start)?,
            window_end: env.time("TRADING_WINDOW_END", filter_defaults.window_end)?,
            utc_offset_minutes: env.parse(
                "MARKET_UTC_OFFSET_MINUTES",
                filter_defaults.utc_offset_minutes,
            ),
            max_daily_loss: env.parse("MAX_DAILY_LOSS", filter_defaults.max_daily_loss),
            max_trades_per_day: env.parse("MAX_TRADES_PER_DAY", filter_defaults.max_trades_per_day),
        };
        if filters.window_start > filters.window_end {
            return Err(ConfigError::Invalid(
                "TRADING_WINDOW_START is after TRADING_WINDOW_END".to_string(),
            ));
        }

        let risk_defaults = RiskGuard::default();
        let risk = RiskGuard {
            max_risk_per_trade: env.parse("MAX_RISK_PER_TRADE", risk_defaults.max_risk_per_trade),
            monthly_loss_limit: env.parse("MONTHLY_LOSS_LIMIT", risk_defaults.monthly_loss_limit),
        };

        let strategies = match env.get("STRATEGY_CONFIG_PATH") {
            Some(path) => load_strategy_table(&path)?,
            None => StrategyTable::builtin(),
        };

        Ok(Self {
            credentials: DhanCredentials::new(client_id, access_token),
            feed,
            instrument_csv_path: PathBuf::from(
                env.string("INSTRUMENT_CSV_PATH", "api-scrip-master-detailed.csv"),
            ),
            chain,
            greeks,
            decision: DecisionSettings {
                filters,
                risk,
                strategies,
            },
            server: ServerSettings {
                http_port: env.parse("HTTP_PORT", ServerSettings::default().http_port),
            },
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Failed to read a configuration file.
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse YAML configuration.
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parse `NIFTY:13,BANKNIFTY:25` into id → symbol.
fn parse_spot_ids(input: &str) -> HashMap<u32, String> {
    input
        .split(',')
        .filter_map(|part| {
            let (symbol, id) = part.trim().split_once(':')?;
            let id = id.trim().parse::<u32>().ok()?;
            let symbol = symbol.trim();
            (!symbol.is_empty()).then(|| (id, symbol.to_uppercase()))
        })
        .collect()
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn time(&self, key: &str, default: NaiveTime) -> Result<NaiveTime, ConfigError> {
        self.get(key).map_or(Ok(default), |v| {
            NaiveTime::parse_from_str(v.trim(), "%H:%M")
                .map_err(|_| ConfigError::Invalid(format!("{key} must be HH:MM, got '{v}'")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDS: [(&str, &str); 2] = [("DHAN_CLIENT_ID", "1100"), ("DHAN_ACCESS_TOKEN", "tok")];

    #[test]
    fn defaults_with_credentials_only() {
        let config = EngineConfig::from_lookup(lookup(&CREDS)).unwrap();
        assert_eq!(config.feed.mode, FeedMode::Full);
        assert_eq!(config.feed.backoff_initial, Duration::from_secs(1));
        assert_eq!(config.feed.backoff_max, Duration::from_secs(300));
        assert_eq!(config.feed.spot_security_ids.get(&13).map(String::as_str), Some("NIFTY"));
        assert_eq!(config.chain.min_complete_strikes, 10);
        assert_eq!(config.chain.snapshot_ttl, Duration::from_secs(15));
        assert_eq!(config.greeks.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.greeks.theta, ThetaConvention::Annual);
        assert_eq!(config.decision.filters.max_trades_per_day, 2);
        assert_eq!(config.decision.strategies.len(), 2);
        assert_eq!(config.server.http_port, 8082);
    }

    #[test]
    fn missing_and_empty_credentials() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "DHAN_CLIENT_ID"));

        let err = EngineConfig::from_lookup(lookup(&[
            ("DHAN_CLIENT_ID", "1100"),
            ("DHAN_ACCESS_TOKEN", " "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref k) if k == "DHAN_ACCESS_TOKEN"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = CREDS.to_vec();
        vars.extend([
            ("FEED_MODE", "QUOTE"),
            ("INSTRUMENTS", "NSE_FNO:35001, IDX_I:13, junk"),
            ("SPOT_SECURITY_IDS", "finnifty:27"),
            ("FEED_BACKOFF_MAX_SECS", "30"),
            ("GREEKS_THETA_CONVENTION", "per_day"),
            ("GREEKS_RECOMPUTE_DEBOUNCE_MS", "250"),
            ("TRADING_WINDOW_START", "09:45"),
            ("MAX_TRADES_PER_DAY", "not-a-number"),
        ]);
        let config = EngineConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.feed.mode, FeedMode::Quote);
        assert_eq!(config.feed.instruments.len(), 2);
        assert_eq!(config.feed.spot_security_ids.get(&27).map(String::as_str), Some("FINNIFTY"));
        assert_eq!(config.feed.backoff_max, Duration::from_secs(30));
        assert_eq!(config.greeks.theta, ThetaConvention::PerDay);
        assert_eq!(config.greeks.recompute_debounce, Duration::from_millis(250));
        assert_eq!(
            config.decision.filters.window_start,
            NaiveTime::from_hms_opt(9, 45, 0).unwrap()
        );
        assert_eq!(config.decision.filters.max_trades_per_day, 2);
    }

    #[test]
    fn inconsistent_values_rejected() {
        let mut vars = CREDS.to_vec();
        vars.push(("FEED_BACKOFF_INITIAL_SECS", "600"));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid(_))
        ));

        let mut vars = CREDS.to_vec();
        vars.push(("TRADING_WINDOW_END", "9pm"));
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn connect_url_carries_auth_query() {
        let settings = FeedSettings::default();
        let creds = DhanCredentials::new("1100".into(), "tok".into());
        assert_eq!(
            settings.connect_url(&creds),
            "wss://api-feed.dhan.co?version=2&token=tok&clientId=1100&authType=2"
        );
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = DhanCredentials::new("1100".into(), "secret-token".into());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("1100"));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
