//! Session refresh behaviour against a mocked wire.
//!
//! These tests pin down the 401 contract: one refresh, one retry, and a destroyed session when either fails.

use std::{io, sync::Arc};

use async_trait::async_trait;
use escrow_client::{
    Backend,
    ClientError,
    CredentialStore,
    Envelope,
    EscrowClient,
    MemoryCredentialStore,
    Reply,
    Request,
    StoredCredentials,
    TransportError,
};
use escrow_common::Secret;
use mockall::{mock, Sequence};
use serde_json::{json, Value};

mock! {
    Wire {}

    #[async_trait]
    impl Backend for Wire {
        async fn send(&self, request: Request) -> Result<Reply, TransportError>;
    }
}

/// Lets a test keep a handle on the store after the client takes ownership of it.
#[derive(Clone)]
struct SharedStore(Arc<MemoryCredentialStore>);

impl SharedStore {
    fn seeded() -> Self {
        let store = MemoryCredentialStore::new();
        store
            .save(&StoredCredentials {
                access_token: Secret::new("stale".to_string()),
                refresh_token: Secret::new("refresh-1".to_string()),
                user: None,
            })
            .unwrap();
        Self(Arc::new(store))
    }
}

impl CredentialStore for SharedStore {
    fn load(&self) -> io::Result<Option<StoredCredentials>> {
        self.0.load()
    }

    fn save(&self, credentials: &StoredCredentials) -> io::Result<()> {
        self.0.save(credentials)
    }

    fn clear(&self) -> io::Result<()> {
        self.0.clear()
    }
}

fn ok(data: Value) -> Result<Reply, TransportError> {
    Ok(Reply {
        status: 200,
        envelope: Envelope { success: true, data: Some(data), error: None, code: None, message: None },
    })
}

fn unauthorized() -> Result<Reply, TransportError> {
    Ok(Reply {
        status: 401,
        envelope: Envelope {
            success: false,
            data: None,
            error: Some("Access token expired".to_string()),
            code: None,
            message: None,
        },
    })
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_the_call_retried_once() {
    let mut wire = MockWire::new();
    let mut seq = Sequence::new();
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile" && r.bearer.as_deref() == Some("stale"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| unauthorized());
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/refresh" && r.body.as_ref().unwrap()["refreshToken"] == "refresh-1")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| ok(json!({ "accessToken": "fresh" })));
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile" && r.bearer.as_deref() == Some("fresh"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| ok(json!({ "id": "u-1", "name": "Wanjiku" })));

    let store = SharedStore::seeded();
    let client = EscrowClient::with_parts(wire, store.clone());
    let profile = client.profile().await.unwrap();
    assert_eq!(profile["id"], "u-1");
    assert!(client.is_authenticated());
    // The refreshed token survives a restart.
    let stored = store.load().unwrap().unwrap();
    assert_eq!(stored.access_token.reveal(), "fresh");
    assert_eq!(stored.refresh_token.reveal(), "refresh-1");
}

#[tokio::test]
async fn rejected_refresh_expires_the_session_and_clears_credentials() {
    let mut wire = MockWire::new();
    let mut seq = Sequence::new();
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| unauthorized());
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/refresh")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Ok(Reply {
                status: 401,
                envelope: Envelope {
                    success: false,
                    data: None,
                    error: Some("Refresh token revoked".to_string()),
                    code: None,
                    message: None,
                },
            })
        });

    let store = SharedStore::seeded();
    let client = EscrowClient::with_parts(wire, store.clone());
    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!client.is_authenticated());
    assert!(store.load().unwrap().is_none(), "both tokens must be cleared together");
}

#[tokio::test]
async fn unreachable_refresh_endpoint_also_expires_the_session() {
    let mut wire = MockWire::new();
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile")
        .times(1)
        .returning(|_| unauthorized());
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/refresh")
        .times(1)
        .returning(|_| Err(TransportError::Network("connection refused".to_string())));

    let store = SharedStore::seeded();
    let client = EscrowClient::with_parts(wire, store.clone());
    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn second_rejection_after_a_refresh_destroys_the_session() {
    let mut wire = MockWire::new();
    let mut seq = Sequence::new();
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile" && r.bearer.as_deref() == Some("stale"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| unauthorized());
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/refresh")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| ok(json!({ "accessToken": "fresh" })));
    // The server rejects even the freshly minted token. No second refresh is attempted.
    wire.expect_send()
        .withf(|r| r.path == "/api/v1/auth/profile" && r.bearer.as_deref() == Some("fresh"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| unauthorized());

    let store = SharedStore::seeded();
    let client = EscrowClient::with_parts(wire, store.clone());
    let err = client.profile().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!client.is_authenticated());
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CoalescingWire {
        refreshes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Backend for CoalescingWire {
        async fn send(&self, request: Request) -> Result<Reply, TransportError> {
            if request.path == "/api/v1/auth/refresh" {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                // Keep the refresh in flight long enough for every caller to pile up behind the gate.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                return ok(json!({ "accessToken": "fresh" }));
            }
            match request.bearer.as_deref() {
                Some("fresh") => ok(json!({ "id": "u-1" })),
                _ => unauthorized(),
            }
        }
    }

    let refreshes = Arc::new(AtomicUsize::new(0));
    let wire = CoalescingWire { refreshes: refreshes.clone() };
    let client = EscrowClient::with_parts(wire, SharedStore::seeded());
    let (a, b, c) = tokio::join!(client.profile(), client.profile(), client.profile());
    assert_eq!(a.unwrap()["id"], "u-1");
    assert_eq!(b.unwrap()["id"], "u-1");
    assert_eq!(c.unwrap()["id"], "u-1");
    assert_eq!(refreshes.load(Ordering::SeqCst), 1, "three rejected callers must share one refresh");
    assert!(client.is_authenticated());
}
