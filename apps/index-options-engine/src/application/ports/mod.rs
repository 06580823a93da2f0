//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StateStore`: shared key/value store for snapshots, heartbeat and
//!   counters written by the execution layer

mod state_store;

#[cfg(test)]
pub use state_store::MockStateStore;
pub use state_store::{
    StateStore, StoreError, get_json, get_number, heartbeat_value, keys, parse_heartbeat_millis,
    set_json,
};
