//! A buyer journey where the payment poller and the live-update reconciler observe the same transaction: both must
//! converge on the remote authority's status, and the change marker must decay on its own afterwards.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use escrow_engine::{
    events::OrderUpdateEvent,
    OrderCache,
    OrderSummary,
    PaymentAttempt,
    PollConfig,
    Poller,
    ProbeError,
    StatusSource,
    TransactionId,
    TransactionStatus,
};
use tokio::sync::mpsc;

/// Stand-in for the remote authority: one mutable status, probed by the poller and pushed over the update channel.
struct Authority {
    status: Mutex<TransactionStatus>,
}

impl Authority {
    fn new() -> Arc<Self> {
        Arc::new(Self { status: Mutex::new(TransactionStatus::Pending) })
    }

    fn set(&self, status: TransactionStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl StatusSource for Authority {
    async fn check_status(&self, _id: &TransactionId) -> Result<TransactionStatus, ProbeError> {
        Ok(*self.status.lock().unwrap())
    }
}

fn pending_order(id: &str) -> OrderSummary {
    OrderSummary {
        id: TransactionId::from(id),
        item_name: "Mountain bike".to_string(),
        amount: escrow_common::Money::try_from(12_500i64).unwrap(),
        status: TransactionStatus::Pending,
        seller: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn poller_and_reconciler_converge_on_the_authority_status() {
    let _ = env_logger::try_init();
    let id = TransactionId::from("tx-journey");
    let authority = Authority::new();

    let cache = OrderCache::new();
    cache.replace_all(vec![pending_order(id.as_str())]);
    let (updates, rx) = mpsc::channel(8);
    let pump = cache.listen(rx);

    let attempt = Arc::new(Mutex::new(PaymentAttempt::Idle));
    attempt.lock().unwrap().begin("ws_CO_journey".to_string()).unwrap();
    let a = attempt.clone();
    let poller = Poller::with_config(Arc::clone(&authority), PollConfig::default());
    let handle = poller.start(id.clone(), move |outcome| {
        a.lock().unwrap().resolve(outcome).unwrap();
    });

    // The buyer approves the prompt at t=4s; the authority settles and pushes a live update.
    tokio::time::sleep(Duration::from_secs(4)).await;
    authority.set(TransactionStatus::Paid);
    updates
        .send(OrderUpdateEvent { order_id: id.clone(), status: TransactionStatus::Paid, timestamp: Utc::now() })
        .await
        .unwrap();

    // The reconciler applies the update before the next probe even lands.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let entry = cache.get(&id).unwrap();
    assert_eq!(entry.order.status, TransactionStatus::Paid);
    assert!(entry.recently_changed);

    // The probe at t=6s sees PAID and resolves the attempt.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.is_finished());
    assert_eq!(*attempt.lock().unwrap(), PaymentAttempt::Success);

    // The change marker decays on its own at t=7s, with no further input.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!cache.get(&id).unwrap().recently_changed);

    drop(updates);
    let _ = pump.await;
}
