//! End-to-end payment wait: initiation, the unauthenticated status probe, and the poller resolving the attempt.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use escrow_client::{Backend, Envelope, EscrowClient, MemoryCredentialStore, Reply, Request, TransportError};
use escrow_engine::{PaymentAttempt, PollConfig, Poller, Transaction, TransactionId, TransactionStatus};
use serde_json::{json, Value};

/// A backend that answers payment initiation and a scripted sequence of status probes, recording every request.
struct PaymentWire {
    statuses: Vec<TransactionStatus>,
    probes: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl PaymentWire {
    fn new(statuses: Vec<TransactionStatus>) -> Arc<Self> {
        Arc::new(Self { statuses, probes: AtomicUsize::new(0), requests: Mutex::new(Vec::new()) })
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

fn ok(data: Value) -> Result<Reply, TransportError> {
    Ok(Reply {
        status: 200,
        envelope: Envelope { success: true, data: Some(data), error: None, code: None, message: None },
    })
}

#[async_trait]
impl Backend for PaymentWire {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match request.path.as_str() {
            "/api/v1/payments/initiate-stk" => ok(json!({ "checkoutRequestID": "ws_CO_77" })),
            "/api/v1/payments/check-status" => {
                let n = self.probes.fetch_add(1, Ordering::SeqCst);
                let status = self.statuses.get(n).or_else(|| self.statuses.last()).copied().unwrap();
                ok(json!({ "status": status }))
            },
            path => Err(TransportError::Network(format!("unexpected path in test: {path}"))),
        }
    }
}

fn payable_transaction(id: &str) -> Transaction {
    let mut tx = Transaction::demo();
    tx.id = TransactionId::from(id);
    tx.status = TransactionStatus::Pending;
    tx
}

#[tokio::test(start_paused = true)]
async fn initiated_payment_resolves_through_the_status_probe() {
    let wire = PaymentWire::new(vec![
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Paid,
    ]);
    let client = Arc::new(EscrowClient::with_parts(Arc::clone(&wire), MemoryCredentialStore::new()));
    let tx = payable_transaction("tx-42");

    let reference = client.initiate_payment(&tx, "0712345678").await.unwrap();
    assert_eq!(reference, "ws_CO_77");
    let attempt = Arc::new(Mutex::new(PaymentAttempt::Idle));
    attempt.lock().unwrap().begin(reference).unwrap();

    let poller = Poller::with_config(Arc::clone(&client), PollConfig::default());
    let a = attempt.clone();
    let handle = poller.start(tx.id.clone(), move |outcome| {
        a.lock().unwrap().resolve(outcome).unwrap();
    });
    // Probes land at 3, 6 and 9 seconds; the third reports PAID.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(handle.is_finished());
    assert_eq!(*attempt.lock().unwrap(), PaymentAttempt::Success);
    assert_eq!(wire.probes(), 3);

    // The initiation request carried the normalized MSISDN and the transaction's own amount.
    let requests = wire.requests.lock().unwrap();
    let initiation = &requests[0];
    let body = initiation.body.as_ref().unwrap();
    assert_eq!(body["transactionId"], "tx-42");
    assert_eq!(body["phoneNumber"], "254712345678");
    assert_eq!(body["amount"], 5000);
    // Status probes are unauthenticated so an expired session cannot interrupt the wait.
    for probe in requests.iter().filter(|r| r.path == "/api/v1/payments/check-status") {
        assert!(probe.bearer.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn buyer_cancellation_fails_the_attempt() {
    let wire = PaymentWire::new(vec![TransactionStatus::Pending, TransactionStatus::Cancelled]);
    let client = Arc::new(EscrowClient::with_parts(Arc::clone(&wire), MemoryCredentialStore::new()));
    let tx = payable_transaction("tx-43");

    let reference = client.initiate_payment(&tx, "+254701002003").await.unwrap();
    let attempt = Arc::new(Mutex::new(PaymentAttempt::Idle));
    attempt.lock().unwrap().begin(reference).unwrap();

    let poller = Poller::with_config(Arc::clone(&client), PollConfig::default());
    let a = attempt.clone();
    let _handle = poller.start(tx.id.clone(), move |outcome| {
        a.lock().unwrap().resolve(outcome).unwrap();
    });
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(*attempt.lock().unwrap(), PaymentAttempt::Failed);
    // The user can retry from here; the attempt returns to Idle and a fresh initiation is allowed.
    attempt.lock().unwrap().retry().unwrap();
    assert_eq!(*attempt.lock().unwrap(), PaymentAttempt::Idle);
}
