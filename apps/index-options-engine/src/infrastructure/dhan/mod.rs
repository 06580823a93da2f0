//! Dhan Market Feed Adapters
//!
//! - **Codec**: little-endian binary frames, one packet per frame
//! - **Messages**: JSON subscribe/unsubscribe requests
//! - **Client**: connection state machine with backoff and in-place resubscribe

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod state;

pub use client::{
    DhanFeedClient, FeedClientConfig, FeedClientError, FeedCommand, FeedEvent, FeedHandle,
};
pub use codec::DhanCodec;
pub use messages::{
    FeedMode, InvalidInstrumentSpec, MAX_INSTRUMENTS_PER_MESSAGE, SubscriptionInstrument,
    SubscriptionRequest, parse_instrument_list,
};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use state::{ConnectionState, FeedState, FeedStatus};
