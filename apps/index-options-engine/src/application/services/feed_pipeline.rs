//! Feed Pipeline
//!
//! Consumes feed events: resolves ticks to contracts, folds them into the
//! chain aggregator, publishes complete snapshots and keeps the feed
//! heartbeat current.
//!
//! The pipeline is the single writer of chain state. Snapshots leave the
//! aggregator as owned copies before any store write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::recompute::RecomputeScheduler;
use crate::application::ports::{StateStore, StoreError, heartbeat_value, keys, set_json};
use crate::domain::chain::{ChainAggregator, ChainKey, OptionChainSnapshot};
use crate::domain::instrument::InstrumentResolver;
use crate::domain::market_data::FeedPacket;
use crate::infrastructure::dhan::{FeedEvent, SubscriptionInstrument};
use crate::infrastructure::metrics;

/// Resolve → aggregate → publish.
pub struct FeedPipeline {
    resolver: Arc<InstrumentResolver>,
    store: Arc<dyn StateStore>,
    aggregator: Mutex<ChainAggregator>,
    spot_ids: HashMap<u32, String>,
    active: RwLock<Option<HashSet<u32>>>,
    snapshot_ttl: Duration,
    recompute: Option<Arc<RecomputeScheduler>>,
}

impl FeedPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        resolver: Arc<InstrumentResolver>,
        store: Arc<dyn StateStore>,
        min_complete_strikes: usize,
        snapshot_ttl: Duration,
        spot_ids: HashMap<u32, String>,
    ) -> Self {
        Self {
            resolver,
            store,
            aggregator: Mutex::new(ChainAggregator::new(min_complete_strikes)),
            spot_ids,
            active: RwLock::new(None),
            snapshot_ttl,
            recompute: None,
        }
    }

    /// Schedule a Greeks recompute on every publish.
    #[must_use]
    pub fn with_recompute(mut self, scheduler: Arc<RecomputeScheduler>) -> Self {
        self.recompute = Some(scheduler);
        self
    }

    /// Restrict accepted ticks to the given subscription.
    pub fn set_active(&self, instruments: &[SubscriptionInstrument]) {
        let ids = instruments
            .iter()
            .filter_map(SubscriptionInstrument::numeric_id)
            .collect();
        *self.active.write() = Some(ids);
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let Err(e) = self.handle_event(event, Utc::now()).await {
                tracing::warn!(error = %e, "Feed pipeline store write failed");
            }
        }
        tracing::info!("Feed pipeline stopped");
    }

    /// Apply one feed event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a publish or heartbeat write fails.
    pub async fn handle_event(&self, event: FeedEvent, now: DateTime<Utc>) -> Result<(), StoreError> {
        match event {
            FeedEvent::Packet(packet) => {
                self.process_packet(&packet, now).await?;
            }
            FeedEvent::Resubscribed { instruments } => {
                self.set_active(&instruments);
                self.invalidate().await?;
            }
            FeedEvent::Connected { instruments } => {
                tracing::info!(instruments, "Feed connected");
            }
            FeedEvent::Reconnecting { attempt, delay } => {
                tracing::debug!(attempt, delay_ms = delay.as_millis(), "Feed reconnecting");
            }
            FeedEvent::Disconnected | FeedEvent::ServerDisconnect { .. } => {}
        }
        Ok(())
    }

    /// Fold one packet. Returns the snapshot when this packet completed a
    /// publish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store write fails.
    pub async fn process_packet(
        &self,
        packet: &FeedPacket,
        now: DateTime<Utc>,
    ) -> Result<Option<OptionChainSnapshot>, StoreError> {
        let Some(tick) = packet.to_tick() else {
            return Ok(None);
        };
        let id = tick.security_id;

        if self.active.read().as_ref().is_some_and(|ids| !ids.contains(&id)) {
            tracing::trace!(security_id = id, "Tick outside active subscription");
            return Ok(None);
        }

        if let Some(underlying) = self.spot_ids.get(&id) {
            if let Some(spot) = tick.last_price {
                self.aggregator.lock().update_spot(underlying, spot);
            }
            self.heartbeat(now).await?;
            return Ok(None);
        }

        let Some(instrument) = self.resolver.resolve(id) else {
            metrics::record_unresolved_tick();
            tracing::trace!(security_id = id, "Unresolved security id");
            return Ok(None);
        };

        self.heartbeat(now).await?;

        let update = self
            .aggregator
            .lock()
            .apply(&instrument, &tick, now.timestamp_millis());
        metrics::set_chain_complete_strikes(&update.key.underlying, update.complete_strikes);

        let Some(snapshot) = update.snapshot else {
            return Ok(None);
        };
        self.publish(&snapshot).await?;
        Ok(Some(snapshot))
    }

    async fn heartbeat(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.store
            .set(keys::LIVE_LAST_PACKET_TS, heartbeat_value(now), None)
            .await
    }

    async fn publish(&self, snapshot: &OptionChainSnapshot) -> Result<(), StoreError> {
        let key = snapshot.key();
        let store = self.store.as_ref();
        set_json(store, &key.current_key(), snapshot, Some(self.snapshot_ttl)).await?;
        set_json(store, &key.last_good_key(), snapshot, None).await?;
        metrics::record_chain_publish(&key.underlying);
        tracing::debug!(
            chain = %key,
            timestamp = snapshot.timestamp,
            strikes = snapshot.strikes.len(),
            "Chain snapshot published"
        );

        if let Some(scheduler) = &self.recompute {
            scheduler.schedule(snapshot.clone());
        }
        Ok(())
    }

    /// Drop every chain built from the previous subscription, locally and
    /// in the store.
    async fn invalidate(&self) -> Result<Vec<ChainKey>, StoreError> {
        let cleared = self.aggregator.lock().clear();
        if let Some(scheduler) = &self.recompute {
            scheduler.cancel_all();
        }
        for key in &cleared {
            self.store.delete(&key.current_key()).await?;
            self.store.delete(&key.last_good_key()).await?;
            self.store.delete(&key.greeks_key()).await?;
        }
        tracing::info!(chains = cleared.len(), "Chain snapshots invalidated after resubscribe");
        Ok(cleared)
    }

    /// Chains currently held.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.aggregator.lock().len()
    }
}

impl std::fmt::Debug for FeedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPipeline")
            .field("instruments", &self.resolver.len())
            .field("chains", &self.chain_count())
            .field("snapshot_ttl", &self.snapshot_ttl)
            .finish_non_exhaustive()
    }
}
