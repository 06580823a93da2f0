//! Debounced Greeks recompute.
//!
//! Each chain publish schedules one recompute after a quiet period. A newer
//! publish for the same chain cancels the pending timer and takes its
//! place, so at most one timer exists per chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::greeks::GreeksService;
use crate::application::ports::{StateStore, set_json};
use crate::domain::chain::{ChainKey, OptionChainSnapshot};

#[derive(Debug)]
struct Pending {
    generation: u64,
    token: CancellationToken,
}

/// Per-chain cancellable recompute timers.
pub struct RecomputeScheduler {
    greeks: Arc<GreeksService>,
    store: Arc<dyn StateStore>,
    debounce: Duration,
    window: usize,
    ttl: Duration,
    pending: Mutex<HashMap<ChainKey, Pending>>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl RecomputeScheduler {
    /// Create a scheduler. Timers are children of `cancel`.
    #[must_use]
    pub fn new(
        greeks: Arc<GreeksService>,
        store: Arc<dyn StateStore>,
        debounce: Duration,
        window: usize,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            greeks,
            store,
            debounce,
            window,
            ttl,
            pending: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            cancel,
        }
    }

    /// Schedule a recompute for `snapshot`, replacing any pending one for
    /// the same chain.
    pub fn schedule(self: &Arc<Self>, snapshot: OptionChainSnapshot) {
        let key = snapshot.key();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.cancel.child_token();

        if let Some(previous) = self.pending.lock().insert(
            key.clone(),
            Pending {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(this.debounce) => {}
            }
            this.finish(&key, generation);
            this.recompute(&snapshot).await;
        });
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) {
        for (_, pending) in self.pending.lock().drain() {
            pending.token.cancel();
        }
    }

    /// Number of chains with a pending timer.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn finish(&self, key: &ChainKey, generation: u64) {
        let mut pending = self.pending.lock();
        if pending.get(key).is_some_and(|p| p.generation == generation) {
            pending.remove(key);
        }
    }

    async fn recompute(&self, snapshot: &OptionChainSnapshot) {
        let key = snapshot.key();
        match self.greeks.compute_chain(snapshot, self.window) {
            Ok(chain) => {
                if let Err(e) = set_json(self.store.as_ref(), &key.greeks_key(), &chain, Some(self.ttl)).await {
                    tracing::warn!(chain = %key, error = %e, "Failed to store chain Greeks");
                } else {
                    tracing::debug!(chain = %key, results = chain.count, "Chain Greeks recomputed");
                }
            }
            Err(e) => tracing::debug!(chain = %key, error = %e, "Chain Greeks skipped"),
        }
    }
}

impl std::fmt::Debug for RecomputeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecomputeScheduler")
            .field("debounce", &self.debounce)
            .field("window", &self.window)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
