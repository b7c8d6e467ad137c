//! Live-update reconciliation for cached order collections.
//!
//! Buyer and seller views fetch a full order listing once, then receive push-style [`OrderUpdateEvent`]s as the
//! remote authority advances transactions. The [`OrderCache`] merges those deltas into the snapshot and flags each
//! touched entry as recently changed for a short window, so observers can highlight "this just moved" without
//! re-fetching.
//!
//! Updates are applied strictly in arrival order. There is no sequence-number protection: if the update channel
//! reorders, a stale update can overwrite a fresher one. That is a documented limitation of the channel contract,
//! not corrected here.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    events::OrderUpdateEvent,
    types::{OrderSummary, TransactionId, TransactionStatus},
};

/// How long an entry stays marked as recently changed after an externally observed update.
pub const DEFAULT_CHANGE_MARKER_WINDOW: Duration = Duration::from_secs(3);

//--------------------------------------     CachedOrder     ---------------------------------------------------------
/// An order plus the ephemeral change marker the reconciler maintains for it.
#[derive(Debug, Clone)]
pub struct CachedOrder {
    pub order: OrderSummary,
    /// True for exactly one marker window after an externally observed change, then reverts on its own.
    pub recently_changed: bool,
    /// When the marker was last set.
    pub changed_at: Option<DateTime<Utc>>,
    /// Bumped on every applied update. A decay task only clears the marker if no newer update arrived in the
    /// interim, i.e. if the generation it captured is still current when it fires.
    generation: u64,
}

impl CachedOrder {
    fn new(order: OrderSummary) -> Self {
        Self { order, recently_changed: false, changed_at: None, generation: 0 }
    }
}

struct CacheInner {
    entries: HashMap<TransactionId, CachedOrder>,
    tracked: HashSet<TransactionId>,
}

//--------------------------------------     OrderCache      ---------------------------------------------------------
/// The shared order collection both write paths feed: full-snapshot replaces from a fetch, and per-entity merges
/// from the live update channel.
#[derive(Clone)]
pub struct OrderCache {
    inner: Arc<Mutex<CacheInner>>,
    window: Duration,
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderCache {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_CHANGE_MARKER_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        let inner = CacheInner { entries: HashMap::new(), tracked: HashSet::new() };
        Self { inner: Arc::new(Mutex::new(inner)), window }
    }

    /// Replace the whole collection from a fresh fetch.
    ///
    /// Entries re-fetched while their change marker is still active keep the marker (and its generation, so the
    /// already-scheduled decay still clears it on time). A replace therefore never silently drops a marker set by
    /// a merge that happened a moment earlier. All ids in the snapshot become tracked.
    pub fn replace_all(&self, orders: Vec<OrderSummary>) {
        let mut inner = self.lock();
        let old = std::mem::take(&mut inner.entries);
        inner.tracked = orders.iter().map(|o| o.id.clone()).collect();
        inner.entries = orders
            .into_iter()
            .map(|order| {
                let id = order.id.clone();
                let mut entry = CachedOrder::new(order);
                if let Some(prev) = old.get(&id) {
                    if prev.recently_changed {
                        entry.recently_changed = true;
                        entry.changed_at = prev.changed_at;
                        entry.generation = prev.generation;
                    }
                }
                (id, entry)
            })
            .collect();
        debug!("🔄️ Order cache replaced: {} entries", inner.entries.len());
    }

    /// Replace the set of transaction ids the reconciler currently cares about.
    ///
    /// Updates for untracked ids are ignored, not errors; callers may shrink or grow the set at any time.
    pub fn track<I>(&self, ids: I)
    where I: IntoIterator<Item = TransactionId> {
        let mut inner = self.lock();
        inner.tracked = ids.into_iter().collect();
        trace!("🔄️ Tracking {} order ids", inner.tracked.len());
    }

    /// Merge one live update into the cache.
    ///
    /// Unknown entities are not inserted out of order, unrecognised statuses are dropped, and untracked ids are
    /// ignored silently. An applied update overwrites the status and updated-at timestamp, arms the change marker
    /// and schedules its decay; a burst of updates for the same entity supersedes earlier pending decays via the
    /// generation counter instead of racing timers.
    ///
    /// Must be called from within a Tokio runtime (the decay is a spawned task).
    pub fn apply_update(&self, event: OrderUpdateEvent) {
        let generation = {
            let mut inner = self.lock();
            if !inner.tracked.contains(&event.order_id) {
                debug!("🔄️ Ignoring update for untracked order [{}]", event.order_id);
                return;
            }
            if event.status == TransactionStatus::Unknown {
                warn!("🔄️ Dropping update with unrecognised status for [{}]", event.order_id);
                return;
            }
            let Some(entry) = inner.entries.get_mut(&event.order_id) else {
                debug!("🔄️ Ignoring update for order [{}] not present in the cache", event.order_id);
                return;
            };
            trace!("🔄️ [{}] {} -> {}", event.order_id, entry.order.status, event.status);
            entry.order.status = event.status;
            entry.order.updated_at = event.timestamp;
            entry.recently_changed = true;
            entry.changed_at = Some(event.timestamp);
            entry.generation += 1;
            entry.generation
        };
        let cache = Arc::clone(&self.inner);
        let window = self.window;
        let id = event.order_id;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut inner = cache.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(entry) = inner.entries.get_mut(&id) {
                if entry.generation == generation {
                    entry.recently_changed = false;
                }
            }
        });
    }

    /// Drop one entry (and its tracking) entirely. Any pending decay for it becomes a no-op.
    pub fn remove(&self, id: &TransactionId) {
        let mut inner = self.lock();
        inner.entries.remove(id);
        inner.tracked.remove(id);
    }

    pub fn get(&self, id: &TransactionId) -> Option<CachedOrder> {
        self.lock().entries.get(id).cloned()
    }

    /// Current view of the collection, newest first.
    pub fn snapshot(&self) -> Vec<CachedOrder> {
        let inner = self.lock();
        let mut orders: Vec<CachedOrder> = inner.entries.values().cloned().collect();
        orders.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        orders
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Spawn a pump that folds every event from the channel into the cache until the sender side closes.
    pub fn listen(&self, mut events: mpsc::Receiver<OrderUpdateEvent>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                cache.apply_update(event);
            }
            debug!("🔄️ Live update channel closed, reconciler pump stopping");
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}
