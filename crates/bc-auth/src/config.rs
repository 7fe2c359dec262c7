use std::time::Duration;
use url::Url;

use crate::errors::{BcAuthError, Result};

/// XRPC method identifiers used by the client
pub mod endpoints {
    pub const DESCRIBE_SERVER: &str = "com.atproto.server.describeServer";
    pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
    pub const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
    pub const GET_SESSION: &str = "com.atproto.server.getSession";
}

/// Flagship Bluesky PDS entryway
pub const SERVER_BSKY_SOCIAL: &str = "https://bsky.social";

/// Scope claim carried by access tokens minted from an app password
pub const APP_PASSWORD_SCOPE: &str = "com.atproto.appPass";

/// Remaining access validity below which a refresh runs in the background
pub const ASYNC_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Remaining access validity below which callers block on a refresh
pub const SYNC_REFRESH_THRESHOLD: Duration = Duration::from_secs(2 * 60);

/// How often the idle refresher re-evaluates the session
pub const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// When and how eagerly the session refreshes its tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    async_threshold: Duration,
    sync_threshold: Duration,
    check_interval: Duration,
}

impl RefreshPolicy {
    /// Requires `async_threshold > sync_threshold > 0` and a non-zero interval.
    pub fn new(
        async_threshold: Duration,
        sync_threshold: Duration,
        check_interval: Duration,
    ) -> Result<Self> {
        if sync_threshold.is_zero() || async_threshold <= sync_threshold {
            return Err(BcAuthError::Configuration(format!(
                "refresh thresholds must satisfy async ({:?}) > sync ({:?}) > 0",
                async_threshold, sync_threshold
            )));
        }
        if check_interval.is_zero() {
            return Err(BcAuthError::Configuration(
                "refresh check interval must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            async_threshold,
            sync_threshold,
            check_interval,
        })
    }

    pub fn async_threshold(&self) -> Duration {
        self.async_threshold
    }

    pub fn sync_threshold(&self) -> Duration {
        self.sync_threshold
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            async_threshold: ASYNC_REFRESH_THRESHOLD,
            sync_threshold: SYNC_REFRESH_THRESHOLD,
            check_interval: REFRESH_CHECK_INTERVAL,
        }
    }
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct BcAuthConfig {
    /// Base URL of the PDS, e.g. `https://bsky.social`
    pub server: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    pub refresh: RefreshPolicy,
}

impl BcAuthConfig {
    /// Config pointing at the public Bluesky server
    pub fn bsky_social() -> Self {
        Self {
            server: Url::parse(SERVER_BSKY_SOCIAL).expect("valid server URL"),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("bsky-client".to_string()),
            refresh: RefreshPolicy::default(),
        }
    }

    /// Config for a self-hosted or alternative PDS
    pub fn custom(server: &str) -> Result<Self> {
        let server = Url::parse(server)?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(BcAuthError::Configuration(format!(
                "unsupported server scheme: {}",
                server.scheme()
            )));
        }
        Ok(Self {
            server,
            ..Self::bsky_social()
        })
    }

    pub fn with_refresh_policy(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }
}

impl Default for BcAuthConfig {
    fn default() -> Self {
        Self::bsky_social()
    }
}
