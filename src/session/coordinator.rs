//! Session token coordinator
//!
//! Owns the process-wide credential state and serializes token refresh.
//! Any number of requests may observe an expired token concurrently; exactly
//! one refresh call goes to the auth collaborator while the rest queue as
//! FIFO waiters and are drained when it resolves.
//!
//! A failed or timed-out refresh is terminal for the session: stored
//! credentials are cleared and every waiter is rejected with
//! [`SessionError::Expired`]. No further auto-refresh happens until a new
//! login.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::auth::{AuthClient, AuthError};
use super::storage::{CredentialStore, Credentials, StoreError};

/// Errors from session management
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session expired; re-authentication required")]
    Expired,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("auth service error: {0}")]
    Auth(#[from] AuthError),

    #[error("credential storage error: {0}")]
    Storage(#[from] StoreError),
}

type TokenWaiter = oneshot::Sender<Result<String, SessionError>>;

#[derive(Default)]
struct CoordState {
    credentials: Option<Credentials>,

    /// True while a refresh call is in flight; guards the single-refresh invariant
    refreshing: bool,

    /// Set after an irrecoverable refresh failure; cleared by login
    dead: bool,

    /// FIFO queue drained when the in-flight refresh resolves
    waiters: VecDeque<TokenWaiter>,
}

/// Serializes credential refresh across concurrent requests
pub struct SessionTokenCoordinator {
    auth: Arc<dyn AuthClient>,
    store: Arc<dyn CredentialStore>,
    refresh_timeout: Duration,
    inner: Mutex<CoordState>,
}

impl SessionTokenCoordinator {
    /// Create a coordinator, seeding credentials from the store
    pub fn new(
        auth: Arc<dyn AuthClient>,
        store: Arc<dyn CredentialStore>,
        refresh_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let credentials = store.load()?;
        if credentials.is_some() {
            debug!("new: seeded persisted credentials");
        }

        Ok(Self {
            auth,
            store,
            refresh_timeout,
            inner: Mutex::new(CoordState {
                credentials,
                ..Default::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CoordState> {
        // Never held across an await, so poisoning only follows a panic
        self.inner.lock().expect("session state lock poisoned")
    }

    /// Current access token for attaching to a request
    pub fn access_token(&self) -> Result<String, SessionError> {
        let state = self.lock();
        if state.dead {
            return Err(SessionError::Expired);
        }
        state
            .credentials
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(SessionError::NotAuthenticated)
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.lock();
        !state.dead && state.credentials.is_some()
    }

    /// Authenticate and atomically replace stored credentials
    ///
    /// Revives a session killed by refresh failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let credentials = self.auth.login(username, password).await?;
        self.store.save(&credentials)?;

        let mut state = self.lock();
        state.credentials = Some(credentials);
        state.dead = false;
        drop(state);

        info!(%username, "login: session established");
        Ok(())
    }

    /// Drop credentials from memory and storage
    pub fn logout(&self) -> Result<(), SessionError> {
        self.lock().credentials = None;
        self.store.clear()?;
        info!("logout: credentials cleared");
        Ok(())
    }

    /// Obtain a fresh access token after an authorization failure
    ///
    /// The first caller while the coordinator is idle becomes the trigger;
    /// everyone else queues behind the in-flight refresh. The refresh itself
    /// runs on a spawned task, so a caller that cancels (drops this future)
    /// neither aborts the refresh nor starves the other waiters.
    pub async fn refresh(self: &Arc<Self>) -> Result<String, SessionError> {
        let rx = {
            let mut state = self.lock();
            if state.dead {
                return Err(SessionError::Expired);
            }

            let (tx, rx) = oneshot::channel();
            if state.refreshing {
                debug!("refresh: already in flight, queuing as waiter");
                state.waiters.push_back(tx);
            } else {
                let Some(credentials) = &state.credentials else {
                    return Err(SessionError::NotAuthenticated);
                };
                let refresh_token = credentials.refresh_token.clone();
                state.refreshing = true;
                state.waiters.push_back(tx);

                let coordinator = Arc::clone(self);
                tokio::spawn(async move { coordinator.drive_refresh(refresh_token).await });
            }
            rx
        };

        match rx.await {
            Ok(result) => result,
            // The drain side only drops senders if the process is tearing down
            Err(_) => Err(SessionError::Expired),
        }
    }

    /// Run the single in-flight refresh call and drain the waiter queue
    async fn drive_refresh(&self, refresh_token: String) {
        let outcome = tokio::time::timeout(self.refresh_timeout, self.auth.refresh(&refresh_token)).await;

        match outcome {
            Ok(Ok(credentials)) => {
                if let Err(e) = self.store.save(&credentials) {
                    warn!(error = %e, "drive_refresh: failed to persist refreshed credentials");
                }

                let access = credentials.access_token.clone();
                let waiters = {
                    let mut state = self.lock();
                    state.credentials = Some(credentials);
                    state.refreshing = false;
                    std::mem::take(&mut state.waiters)
                };

                info!(waiters = waiters.len(), "drive_refresh: refresh succeeded");
                for waiter in waiters {
                    // Canceled waiters have dropped their receiver; ignore
                    let _ = waiter.send(Ok(access.clone()));
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "drive_refresh: refresh rejected, session is dead");
                self.kill_session();
            }
            Err(_) => {
                warn!(timeout = ?self.refresh_timeout, "drive_refresh: refresh timed out, session is dead");
                self.kill_session();
            }
        }
    }

    /// Terminal failure path: clear credentials, reject every waiter
    fn kill_session(&self) {
        let waiters = {
            let mut state = self.lock();
            state.credentials = None;
            state.refreshing = false;
            state.dead = true;
            std::mem::take(&mut state.waiters)
        };

        if let Err(e) = self.store.clear() {
            warn!(error = %e, "kill_session: failed to clear credential store");
        }

        for waiter in waiters {
            let _ = waiter.send(Err(SessionError::Expired));
        }
    }
}
