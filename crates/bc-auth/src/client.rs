use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::{BcAuthConfig, RefreshPolicy};
use crate::errors::{BcAuthError, Result};
use crate::jwt::{TokenDecoder, UnverifiedJwtDecoder};
use crate::lifecycle::{RefreshHook, Refresher, SessionManager};
use crate::session::{AuthInfo, Credentials, SessionState};
use crate::transport::Transport;
use crate::xrpc::XrpcTransport;

/// API client attached to (and authenticated with) a PDS
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    refresher: Mutex<Option<Refresher>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("policy", self.inner.session.policy())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connect to the configured server and check that it answers
    #[instrument(skip(config), fields(server = %config.server))]
    pub async fn dial(config: BcAuthConfig) -> Result<Self> {
        let transport = Arc::new(XrpcTransport::new(&config)?);
        Self::dial_with_transport(transport, config.refresh).await
    }

    /// Connect through a caller supplied transport
    pub async fn dial_with_transport(
        transport: Arc<dyn Transport>,
        policy: RefreshPolicy,
    ) -> Result<Self> {
        transport.describe_server().await?;
        debug!("Server reachable");
        Ok(Self::with_transport(transport, policy))
    }

    /// Build a client without probing the server
    pub fn with_transport(transport: Arc<dyn Transport>, policy: RefreshPolicy) -> Self {
        Self::with_decoder(transport, Arc::new(UnverifiedJwtDecoder), policy)
    }

    pub fn with_decoder(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn TokenDecoder>,
        policy: RefreshPolicy,
    ) -> Self {
        let session = Arc::new(SessionManager::new(Arc::clone(&transport), decoder, policy));
        Self {
            inner: Arc::new(ClientInner {
                transport,
                session,
                refresher: Mutex::new(None),
            }),
        }
    }

    /// Authenticate with a handle (or DID / email) and an app password.
    ///
    /// Logging in with the account's master password is detected and
    /// rejected with [`BcAuthError::MasterCredentials`].
    pub async fn login(&self, identifier: &str, app_password: &str) -> Result<Credentials> {
        let credentials = self.inner.session.login(identifier, app_password).await?;

        let mut refresher = self.inner.refresher.lock().await;
        if refresher.is_none() {
            *refresher = Some(Refresher::spawn(&self.inner.session));
        }
        Ok(credentials)
    }

    /// Refresh the session if needed. Called before every authenticated request.
    pub async fn ensure_valid(&self) -> Result<()> {
        self.inner.session.ensure_valid().await
    }

    /// Current credentials, if logged in
    pub async fn credentials(&self) -> Option<Credentials> {
        self.inner.session.snapshot().await
    }

    pub async fn session_state(&self) -> Option<SessionState> {
        self.inner.session.state().await
    }

    /// Install a diagnostic callback receiving `(skipped, was_async)` on every
    /// refresh decision
    pub fn set_refresh_hook<F>(&self, hook: F)
    where
        F: Fn(bool, bool) + Send + Sync + 'static,
    {
        let hook: RefreshHook = Arc::new(hook);
        self.inner.session.set_hook(Some(hook));
    }

    pub fn clear_refresh_hook(&self) {
        self.inner.session.set_hook(None);
    }

    /// Authenticated XRPC query
    pub async fn query(&self, nsid: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        self.ensure_valid().await?;
        let auth = self.inner.session.auth_info().await?;
        self.inner.transport.query(Some(&auth), nsid, params).await
    }

    /// Download a public blob (avatar, banner) with a size cap
    pub async fn fetch_blob(&self, url: &str, limit: u64) -> Result<Vec<u8>> {
        self.inner.transport.fetch_blob(url, limit).await
    }

    /// Run calls this library does not wrap.
    ///
    /// The callback receives a [`RawCall`] holding a copy of the current
    /// credentials. The copy does not follow later refreshes, so it must not be
    /// kept beyond the callback.
    pub async fn custom_call<F, Fut, T, E>(&self, callback: F) -> std::result::Result<T, E>
    where
        F: FnOnce(RawCall) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<BcAuthError>,
    {
        self.ensure_valid().await?;
        let auth = self.inner.session.auth_info().await?;

        callback(RawCall {
            transport: Arc::clone(&self.inner.transport),
            auth,
        })
        .await
    }

    /// Stop background work and forget the credentials
    pub async fn close(&self) {
        let refresher = self.inner.refresher.lock().await.take();
        if let Some(refresher) = refresher {
            refresher.stop().await;
        }
        self.inner.session.clear().await;
        info!("Client closed");
    }
}

/// One-shot handle for direct XRPC calls
///
/// Carries a snapshot of the credentials taken when it was handed out; it
/// goes stale after the next refresh.
pub struct RawCall {
    transport: Arc<dyn Transport>,
    auth: AuthInfo,
}

impl RawCall {
    pub fn auth(&self) -> &AuthInfo {
        &self.auth
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub async fn query(&self, nsid: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        self.transport.query(Some(&self.auth), nsid, params).await
    }
}
