//! Session and token management.
//!
//! The session manager is the sole owner of the access/refresh token pair: no other component reads or writes
//! credentials, in memory or on disk. Every authenticated request funnels through [`SessionManager::authorized_send`],
//! which recovers from an expired access token at most once per logical call. Concurrent callers that hit a 401 at
//! the same time share a single refresh: the refresh gate serialises them, and the session epoch tells a waiter
//! that the work was already done by the caller ahead of it.

use escrow_common::Secret;
use log::*;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    errors::ClientError,
    store::{CredentialStore, StoredCredentials},
    transport::{Backend, Reply, Request},
};

const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Default)]
struct Session {
    access: Option<Secret<String>>,
    refresh: Option<Secret<String>>,
    user: Option<String>,
    /// Bumped every time the access token is replaced. A caller that observed an older epoch before failing knows
    /// a concurrent refresh already happened and must not issue another one.
    epoch: u64,
}

#[derive(Deserialize)]
struct RefreshPayload {
    #[serde(rename = "accessToken")]
    access_token: String,
}

//--------------------------------------   SessionManager    ---------------------------------------------------------
pub struct SessionManager<B, C> {
    backend: B,
    store: C,
    session: std::sync::Mutex<Session>,
    refresh_gate: AsyncMutex<()>,
}

impl<B, C> SessionManager<B, C>
where
    B: Backend,
    C: CredentialStore,
{
    /// Create a manager, resuming any session the store still holds.
    pub fn new(backend: B, store: C) -> Self {
        let session = match store.load() {
            Ok(Some(credentials)) => Session {
                access: Some(credentials.access_token),
                refresh: Some(credentials.refresh_token),
                user: credentials.user,
                epoch: 0,
            },
            Ok(None) => Session::default(),
            Err(e) => {
                warn!("🔐️ Could not read stored credentials, starting unauthenticated: {e}");
                Session::default()
            },
        };
        Self { backend, store, session: std::sync::Mutex::new(session), refresh_gate: AsyncMutex::new(()) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_session().access.is_some()
    }

    /// The cached user profile blob, exactly as the server last sent it.
    pub fn cached_user(&self) -> Option<String> {
        self.lock_session().user.clone()
    }

    /// Install a fresh session after a successful login or registration, persisting it as a unit.
    pub fn establish(&self, access_token: String, refresh_token: String, user: Option<String>) {
        {
            let mut session = self.lock_session();
            session.access = Some(Secret::new(access_token));
            session.refresh = Some(Secret::new(refresh_token));
            session.user = user;
            session.epoch += 1;
        }
        self.persist();
    }

    /// Destroy the session: both tokens and the cached profile go, in memory and in the store.
    pub fn destroy(&self) {
        {
            let mut session = self.lock_session();
            session.access = None;
            session.refresh = None;
            session.user = None;
        }
        if let Err(e) = self.store.clear() {
            warn!("🔐️ Failed to clear stored credentials: {e}");
        }
    }

    /// The refresh token, needed once at logout to revoke the session server-side.
    pub fn refresh_token(&self) -> Option<String> {
        self.lock_session().refresh.as_ref().map(|t| t.reveal().clone())
    }

    /// Issue an unauthenticated request. No credential is attached and no refresh is ever attempted.
    pub async fn send(&self, request: Request) -> Result<Reply, ClientError> {
        Ok(self.backend.send(request).await?)
    }

    /// Issue an authenticated request, transparently recovering from an expired access token exactly once.
    ///
    /// The original attempt always precedes the retried one, and at most one retry is ever issued. If the refresh
    /// fails, or the retried call is rejected again, the session is destroyed and the caller receives
    /// [`ClientError::SessionExpired`], which is distinct from an ordinary authentication refusal.
    pub async fn authorized_send(&self, request: Request) -> Result<Reply, ClientError> {
        let (bearer, epoch) = {
            let session = self.lock_session();
            (session.access.as_ref().map(|t| t.reveal().clone()), session.epoch)
        };
        let mut first = request.clone();
        first.bearer = bearer;
        let reply = self.backend.send(first).await?;
        if !reply.is_auth_failure() {
            return Ok(reply);
        }
        debug!("🔐️ {} {} was rejected with 401, attempting token refresh", request.method, request.path);
        let token = self.refresh_access_token(epoch).await?;
        let reply = self.backend.send(request.with_bearer(token)).await?;
        if reply.is_auth_failure() {
            // Twice in a row means the refreshed credential is no good either; the session is unsalvageable.
            warn!("🔐️ Retried call was rejected again after a refresh, destroying the session");
            self.destroy();
            return Err(ClientError::SessionExpired);
        }
        Ok(reply)
    }

    /// Obtain a usable access token, refreshing it at most once.
    ///
    /// Coalescing: the gate admits one caller at a time, and a caller whose observed epoch is stale on entry reuses
    /// the token its predecessor installed instead of issuing a duplicate refresh. Exactly one refresh call is in
    /// flight per session at any moment.
    async fn refresh_access_token(&self, observed_epoch: u64) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        {
            let session = self.lock_session();
            if session.epoch > observed_epoch {
                if let Some(token) = &session.access {
                    trace!("🔐️ Reusing the token a concurrent caller just refreshed");
                    return Ok(token.reveal().clone());
                }
            }
        }
        let refresh = self.lock_session().refresh.clone();
        let Some(refresh) = refresh else {
            self.destroy();
            return Err(ClientError::SessionExpired);
        };
        info!("🔐️ Access token rejected, refreshing the session");
        let request = Request::post(REFRESH_PATH, json!({ "refreshToken": refresh.take() }));
        let token = match self.backend.send(request).await {
            Ok(reply) if reply.envelope.success => match reply.envelope.decode::<RefreshPayload>() {
                Ok(payload) => payload.access_token,
                Err(e) => {
                    warn!("🔐️ Refresh response was malformed: {e}");
                    self.destroy();
                    return Err(ClientError::SessionExpired);
                },
            },
            Ok(reply) => {
                warn!("🔐️ Refresh was rejected: {}", reply.envelope.reason());
                self.destroy();
                return Err(ClientError::SessionExpired);
            },
            Err(e) => {
                warn!("🔐️ Refresh call failed: {e}");
                self.destroy();
                return Err(ClientError::SessionExpired);
            },
        };
        {
            let mut session = self.lock_session();
            session.access = Some(Secret::new(token.clone()));
            session.epoch += 1;
        }
        self.persist();
        Ok(token)
    }

    fn persist(&self) {
        let credentials = {
            let session = self.lock_session();
            match (&session.access, &session.refresh) {
                (Some(access), Some(refresh)) => StoredCredentials {
                    access_token: access.clone(),
                    refresh_token: refresh.clone(),
                    user: session.user.clone(),
                },
                _ => return,
            }
        };
        if let Err(e) = self.store.save(&credentials) {
            warn!("🔐️ Failed to persist credentials: {e}");
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }
}
