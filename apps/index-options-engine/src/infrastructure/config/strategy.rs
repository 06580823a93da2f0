//! Strategy table loading from YAML with environment variable interpolation.

use std::sync::OnceLock;

use super::settings::ConfigError;
use crate::domain::decision::StrategyTable;

/// Load a per-underlying strategy table from a YAML file.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or is empty.
pub fn load_strategy_table(path: &str) -> Result<StrategyTable, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;
    let table = parse_strategy_table(&contents)?;
    tracing::info!(
        path,
        underlyings = ?table.underlyings(),
        "Loaded strategy table"
    );
    Ok(table)
}

/// Parse a strategy table from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or holds no
/// profiles.
pub fn parse_strategy_table(yaml: &str) -> Result<StrategyTable, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let table: StrategyTable = serde_yaml_bw::from_str(&interpolated)?;
    validate_table(&table)?;
    Ok(table)
}

fn validate_table(table: &StrategyTable) -> Result<(), ConfigError> {
    if table.is_empty() {
        return Err(ConfigError::Invalid(
            "strategy table defines no underlyings".to_string(),
        ));
    }
    for name in table.underlyings() {
        let Some(profile) = table.get(name) else {
            continue;
        };
        if profile.lot_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: lot_size must be positive"
            )));
        }
        let spread = &profile.credit_spread;
        let condor = &profile.iron_condor;
        if spread.min_distance > spread.max_distance || condor.min_distance > condor.max_distance {
            return Err(ConfigError::Invalid(format!(
                "{name}: min_distance exceeds max_distance"
            )));
        }
        if spread.hedge_gap <= 0.0 || condor.hedge_gap <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: hedge_gap must be positive"
            )));
        }
    }
    Ok(())
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let var_name = caps.get(1).map_or("", |m| m.as_str());
        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => caps
                .get(2)
                .map_or_else(String::new, |m| m.as_str().to_string()),
        }
    })
    .into_owned()
}
