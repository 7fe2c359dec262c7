use crate::errors::Result;
use crate::models::SessionGrant;
use crate::session::AuthInfo;

/// Network capabilities the session and the graph resolver are built on
///
/// Implementations own timeouts and connection handling. Every failure they
/// return is passed to callers unchanged.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Unauthenticated liveness probe
    async fn describe_server(&self) -> Result<()>;

    /// Exchange an identifier and secret for a fresh token pair
    async fn create_session(&self, identifier: &str, secret: &str) -> Result<SessionGrant>;

    /// Rotate the token pair; `auth.access_jwt` already carries the refresh token
    async fn refresh_session(&self, auth: &AuthInfo) -> Result<SessionGrant>;

    /// XRPC query (HTTP GET) returning the raw JSON body
    async fn query(
        &self,
        auth: Option<&AuthInfo>,
        nsid: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value>;

    /// Download an absolute URL, failing once more than `limit` bytes arrive
    /// (`0` disables the cap)
    async fn fetch_blob(&self, url: &str, limit: u64) -> Result<Vec<u8>>;
}
