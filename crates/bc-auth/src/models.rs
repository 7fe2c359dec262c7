use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// com.atproto.server.createSession request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// Tokens and identity returned by both createSession and refreshSession
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub access_jwt: Zeroizing<String>,
    pub refresh_jwt: Zeroizing<String>,
    pub handle: String,
    pub did: String,
}

impl std::fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGrant")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .finish_non_exhaustive()
    }
}

/// com.atproto.server.describeServer response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeServerResponse {
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub available_user_domains: Vec<String>,
    #[serde(default)]
    pub invite_code_required: Option<bool>,
}

/// Error body returned by XRPC endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct XrpcErrorBody {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
}
