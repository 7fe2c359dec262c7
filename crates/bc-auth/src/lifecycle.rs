//! Session token lifecycle.
//!
//! Lock discipline:
//! - `credentials` (RwLock) is read to derive the session state and to take
//!   snapshots, and written only to swap in a refreshed token set or to clear
//!   it on close. It is never held across a network call.
//! - `refresh_gate` (Mutex) is held for the whole of a refresh, network call
//!   included, so blocking callers queue behind whoever is refreshing and then
//!   find the session already fresh.
//! - `background_slot` (one permit) admits at most one detached refresh task.

use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{RefreshPolicy, APP_PASSWORD_SCOPE};
use crate::errors::{BcAuthError, Result};
use crate::jwt::TokenDecoder;
use crate::models::SessionGrant;
use crate::session::{AuthInfo, Credentials, SessionState};
use crate::transport::Transport;

/// Diagnostic callback invoked on every refresh decision with
/// `(skipped, was_async)`
pub type RefreshHook = Arc<dyn Fn(bool, bool) + Send + Sync>;

/// Result of a single refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// Tokens were rotated
    Refreshed,
    /// Someone else already refreshed; nothing was sent
    Skipped,
}

pub(crate) struct SessionManager {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn TokenDecoder>,
    policy: RefreshPolicy,
    credentials: RwLock<Option<Credentials>>,
    refresh_gate: Mutex<()>,
    background_slot: Arc<Semaphore>,
    hook: std::sync::RwLock<Option<RefreshHook>>,
}

impl SessionManager {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn TokenDecoder>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            transport,
            decoder,
            policy,
            credentials: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            background_slot: Arc::new(Semaphore::new(1)),
            hook: std::sync::RwLock::new(None),
        }
    }

    pub(crate) fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub(crate) fn set_hook(&self, hook: Option<RefreshHook>) {
        if let Ok(mut slot) = self.hook.write() {
            *slot = hook;
        }
    }

    fn notify(&self, skipped: bool, was_async: bool) {
        let hook = self.hook.read().ok().and_then(|slot| slot.clone());
        if let Some(hook) = hook {
            hook(skipped, was_async);
        }
    }

    /// Authenticate and install the resulting credentials.
    ///
    /// Master passwords are vetoed even when the server accepts them.
    #[instrument(skip(self, secret))]
    pub(crate) async fn login(&self, identifier: &str, secret: &str) -> Result<Credentials> {
        let grant = self.transport.create_session(identifier, secret).await?;

        let access = self.decoder.decode(&grant.access_jwt)?;
        if access.scope.as_deref() != Some(APP_PASSWORD_SCOPE) {
            warn!(
                scope = access.scope.as_deref().unwrap_or("-"),
                "Refusing session created with master credentials"
            );
            return Err(BcAuthError::MasterCredentials);
        }

        let credentials = self.credentials_from_grant(grant)?;
        *self.credentials.write().await = Some(credentials.clone());

        info!(
            handle = %credentials.handle,
            did = %credentials.did,
            access_expiry = %credentials.access_expiry,
            "Logged in"
        );
        Ok(credentials)
    }

    fn credentials_from_grant(&self, grant: SessionGrant) -> Result<Credentials> {
        let access = self.decoder.decode(&grant.access_jwt)?;
        let refresh = self.decoder.decode(&grant.refresh_jwt)?;
        if let Some(subject) = access.subject.as_deref().filter(|sub| *sub != grant.did) {
            return Err(BcAuthError::Decode(format!(
                "access token subject {subject} does not match session DID {}",
                grant.did
            )));
        }

        Ok(Credentials {
            access_jwt: grant.access_jwt,
            refresh_jwt: grant.refresh_jwt,
            access_expiry: access.expiry,
            refresh_expiry: refresh.expiry,
            did: grant.did,
            handle: grant.handle,
        })
    }

    pub(crate) async fn snapshot(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    pub(crate) async fn auth_info(&self) -> Result<AuthInfo> {
        self.credentials
            .read()
            .await
            .as_ref()
            .map(Credentials::auth_info)
            .ok_or(BcAuthError::NotLoggedIn)
    }

    pub(crate) async fn state(&self) -> Option<SessionState> {
        self.credentials
            .read()
            .await
            .as_ref()
            .map(|creds| creds.state(&self.policy))
    }

    /// Make sure the access token is usable for the next call.
    pub(crate) async fn ensure_valid(self: &Arc<Self>) -> Result<()> {
        let (state, refresh_expiry) = {
            let guard = self.credentials.read().await;
            let creds = guard.as_ref().ok_or(BcAuthError::NotLoggedIn)?;
            (creds.state(&self.policy), creds.refresh_expiry)
        };

        match state {
            SessionState::Fresh => Ok(()),
            SessionState::RefreshDead => Err(BcAuthError::SessionExpired {
                expired_at: refresh_expiry,
            }),
            SessionState::NearExpiry => {
                self.spawn_background_refresh();
                Ok(())
            }
            SessionState::Stale => {
                // Runs detached: dropping the caller never aborts a rotation in flight
                let manager = Arc::clone(self);
                let refresh = tokio::spawn(async move {
                    let _gate = manager.refresh_gate.lock().await;
                    manager.refresh(false).await
                });
                match refresh.await {
                    Ok(outcome) => outcome.map(|_| ()),
                    Err(e) => Err(BcAuthError::Transport(format!("refresh task failed: {e}"))),
                }
            }
        }
    }

    fn spawn_background_refresh(self: &Arc<Self>) {
        let Ok(permit) = Arc::clone(&self.background_slot).try_acquire_owned() else {
            debug!("Background refresh already in flight");
            return;
        };

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            let _gate = manager.refresh_gate.lock().await;
            if let Err(e) = manager.refresh(true).await {
                warn!(error = %e, "Background session refresh failed");
            }
        });
    }

    /// Rotate the token pair. Callers must hold `refresh_gate`.
    async fn refresh(&self, was_async: bool) -> Result<RefreshOutcome> {
        let (state, snapshot, refresh_expiry) = {
            let guard = self.credentials.read().await;
            let creds = guard.as_ref().ok_or(BcAuthError::NotLoggedIn)?;
            (
                creds.state(&self.policy),
                creds.refresh_auth_info(),
                creds.refresh_expiry,
            )
        };

        if state == SessionState::Fresh {
            debug!(was_async, "Session already refreshed, skipping");
            self.notify(true, was_async);
            return Ok(RefreshOutcome::Skipped);
        }
        self.notify(false, was_async);

        if refresh_expiry <= Utc::now() {
            return Err(BcAuthError::SessionExpired {
                expired_at: refresh_expiry,
            });
        }

        let grant = self.transport.refresh_session(&snapshot).await?;
        let fresh = self.credentials_from_grant(grant)?;

        let mut guard = self.credentials.write().await;
        if guard.is_none() {
            debug!("Session closed during refresh, dropping new tokens");
            return Err(BcAuthError::NotLoggedIn);
        }
        info!(
            was_async,
            access_expiry = %fresh.access_expiry,
            refresh_expiry = %fresh.refresh_expiry,
            "Session refreshed"
        );
        *guard = Some(fresh);
        Ok(RefreshOutcome::Refreshed)
    }

    pub(crate) async fn clear(&self) {
        *self.credentials.write().await = None;
    }
}

/// Handle to the periodic refresh checker
pub(crate) struct Refresher {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Refresher {
    /// Spawn the checker. It holds only a weak reference, so a dropped client
    /// ends it on the next tick.
    pub(crate) fn spawn(manager: &Arc<SessionManager>) -> Self {
        let shutdown = CancellationToken::new();
        let weak: Weak<SessionManager> = Arc::downgrade(manager);
        let period = manager.policy().check_interval();
        let stop = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(?period, "Started session refresher");

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = manager.ensure_valid().await {
                    warn!(error = %e, "Periodic session check failed");
                }
            }

            debug!("Session refresher stopped");
        });

        Self { shutdown, task }
    }

    pub(crate) async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session refresher ended abnormally");
        }
    }
}
