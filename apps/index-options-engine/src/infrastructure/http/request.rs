//! HTTP request DTOs.

use serde::Deserialize;

use crate::application::services::GreeksRequest;
use crate::infrastructure::dhan::{InvalidInstrumentSpec, SubscriptionInstrument};

/// Batch Greeks body: `{"requests": [...]}` or a bare list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchGreeksRequest {
    /// Wrapped list.
    Wrapped {
        /// Contracts to price.
        requests: Vec<GreeksRequest>,
    },
    /// Bare list.
    List(Vec<GreeksRequest>),
}

impl BatchGreeksRequest {
    /// Contracts to price.
    #[must_use]
    pub fn into_requests(self) -> Vec<GreeksRequest> {
        match self {
            Self::Wrapped { requests } | Self::List(requests) => requests,
        }
    }
}

/// Subscription entry: `"SEG:ID"` or `{"ExchangeSegment", "SecurityId"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InstrumentSpec {
    /// Compact `SEG:ID` form.
    Compact(String),
    /// Object form.
    Object(SubscriptionInstrument),
}

impl TryFrom<InstrumentSpec> for SubscriptionInstrument {
    type Error = InvalidInstrumentSpec;

    fn try_from(spec: InstrumentSpec) -> Result<Self, Self::Error> {
        match spec {
            InstrumentSpec::Compact(s) => s.parse(),
            InstrumentSpec::Object(instrument) => Ok(instrument),
        }
    }
}

/// Resubscribe body.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    /// New instrument set.
    pub instruments: Vec<InstrumentSpec>,
}

impl SubscribeRequest {
    /// Parse every entry.
    ///
    /// # Errors
    ///
    /// Returns the first malformed entry.
    pub fn parse(self) -> Result<Vec<SubscriptionInstrument>, InvalidInstrumentSpec> {
        self.instruments
            .into_iter()
            .map(SubscriptionInstrument::try_from)
            .collect()
    }
}

/// Query of the chain Greeks endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChainWindowQuery {
    /// Strikes either side of ATM.
    pub window: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_accepts_both_shapes() {
        let one = r#"{"symbol":"NIFTY","underlying":24000,"strike":24000,"expiry":"2025-01-30","option_type":"CE","iv":0.15}"#;
        let wrapped: BatchGreeksRequest =
            serde_json::from_str(&format!(r#"{{"requests":[{one},{one}]}}"#)).unwrap();
        let list: BatchGreeksRequest = serde_json::from_str(&format!("[{one}]")).unwrap();
        assert_eq!(wrapped.into_requests().len(), 2);
        assert_eq!(list.into_requests().len(), 1);
    }

    #[test]
    fn subscribe_accepts_mixed_specs() {
        let body: SubscribeRequest = serde_json::from_str(
            r#"{"instruments":["NSE_FNO:35001",{"ExchangeSegment":"IDX_I","SecurityId":"13"}]}"#,
        )
        .unwrap();
        let parsed = body.parse().unwrap();
        assert_eq!(parsed[0], SubscriptionInstrument::new("NSE_FNO", "35001"));
        assert_eq!(parsed[1], SubscriptionInstrument::new("IDX_I", "13"));
    }

    #[test]
    fn subscribe_rejects_malformed_spec() {
        let body: SubscribeRequest =
            serde_json::from_str(r#"{"instruments":["NSE_FNO35001"]}"#).unwrap();
        assert_eq!(
            body.parse().unwrap_err(),
            InvalidInstrumentSpec("NSE_FNO35001".to_string())
        );
    }
}
