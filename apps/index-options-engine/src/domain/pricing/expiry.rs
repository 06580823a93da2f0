//! Time-to-expiry in years.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Expiry string that is neither a date nor a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid expiry '{0}', expected YYYY-MM-DD or an ISO-8601 timestamp")]
pub struct InvalidExpiry(pub String);

/// Parse an expiry as a UTC instant.
///
/// Accepts `YYYY-MM-DD` (midnight UTC), a naive `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC) or an RFC 3339 timestamp.
///
/// # Errors
///
/// Returns [`InvalidExpiry`] if none of the formats match.
pub fn parse_expiry(expiry: &str) -> Result<DateTime<Utc>, InvalidExpiry> {
    let trimmed = expiry.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| InvalidExpiry(expiry.to_string()))
}

/// Years from `now` until `expiry`; zero once expired.
///
/// # Errors
///
/// Returns [`InvalidExpiry`] if the expiry cannot be parsed.
pub fn years_to_expiry(expiry: &str, now: DateTime<Utc>) -> Result<f64, InvalidExpiry> {
    let expires_at = parse_expiry(expiry)?;
    #[allow(clippy::cast_precision_loss)]
    let seconds = (expires_at - now).num_milliseconds() as f64 / 1000.0;
    Ok((seconds / SECONDS_PER_YEAR).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_only_is_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2025, 1, 29, 0, 0, 0).unwrap();
        let years = years_to_expiry("2025-01-30", now).unwrap();
        assert!((years - 1.0 / 365.0).abs() < 1e-12);
    }

    #[test]
    fn timestamps_accepted() {
        let now = Utc.with_ymd_and_hms(2025, 1, 30, 0, 0, 0).unwrap();
        let naive = years_to_expiry("2025-01-30T10:00:00", now).unwrap();
        let rfc = years_to_expiry("2025-01-30T15:30:00+05:30", now).unwrap();
        assert!((naive - rfc).abs() < 1e-12);
        assert!(naive > 0.0);
    }

    #[test]
    fn past_expiry_is_zero() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        assert!(years_to_expiry("2025-01-30", now).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse_expiry("30-01-2025").is_err());
        assert!(parse_expiry("").is_err());
    }
}
