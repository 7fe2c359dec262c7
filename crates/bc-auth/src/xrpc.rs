use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use crate::config::{endpoints, BcAuthConfig};
use crate::errors::{BcAuthError, Result};
use crate::models::{CreateSessionRequest, DescribeServerResponse, SessionGrant, XrpcErrorBody};
use crate::session::AuthInfo;
use crate::transport::Transport;

/// XRPC transport over HTTP
#[derive(Debug, Clone)]
pub struct XrpcTransport {
    base: Url,
    http: Client,
}

impl XrpcTransport {
    /// Create a transport for the configured server
    pub fn new(config: &BcAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("bsky-client"))
            .build()?;

        let mut base = config.server.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self { base, http })
    }

    fn method_url(&self, nsid: &str) -> Result<Url> {
        Ok(self.base.join(&format!("xrpc/{nsid}"))?)
    }
}

/// Turn a non-success response into the matching error
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<XrpcErrorBody>(&body) {
        Ok(xrpc) => Err(BcAuthError::Xrpc {
            status,
            message: xrpc.message.unwrap_or_default(),
            error: xrpc.error,
        }),
        Err(_) => Err(BcAuthError::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }),
    }
}

#[async_trait::async_trait]
impl Transport for XrpcTransport {
    #[instrument(skip(self))]
    async fn describe_server(&self) -> Result<()> {
        let url = self.method_url(endpoints::DESCRIBE_SERVER)?;

        debug!("Probing server");
        let response = check_status(self.http.get(url).send().await?).await?;
        let description: DescribeServerResponse = response.json().await?;

        debug!(
            did = description.did.as_deref().unwrap_or("-"),
            domains = description.available_user_domains.len(),
            "Server described"
        );
        Ok(())
    }

    #[instrument(skip(self, secret))]
    async fn create_session(&self, identifier: &str, secret: &str) -> Result<SessionGrant> {
        let url = self.method_url(endpoints::CREATE_SESSION)?;
        let request = CreateSessionRequest {
            identifier,
            password: secret,
        };

        debug!("Creating session");
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        match check_status(response).await {
            Ok(response) => Ok(response.json().await?),
            Err(BcAuthError::Xrpc {
                status,
                error,
                message,
            }) if status == StatusCode::UNAUTHORIZED || error == "AuthenticationRequired" => {
                Err(BcAuthError::Unauthorized(if message.is_empty() {
                    error
                } else {
                    message
                }))
            }
            Err(BcAuthError::Http { status, body_snippet }) if status == StatusCode::UNAUTHORIZED => {
                Err(BcAuthError::Unauthorized(body_snippet))
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, auth), fields(did = %auth.did))]
    async fn refresh_session(&self, auth: &AuthInfo) -> Result<SessionGrant> {
        let url = self.method_url(endpoints::REFRESH_SESSION)?;

        debug!("Refreshing session");
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .bearer_auth(auth.access_jwt.as_str())
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    #[instrument(skip(self, auth, params))]
    async fn query(
        &self,
        auth: Option<&AuthInfo>,
        nsid: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let mut url = self.method_url(nsid)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(auth) = auth {
            request = request.bearer_auth(auth.access_jwt.as_str());
        }

        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self))]
    async fn fetch_blob(&self, url: &str, limit: u64) -> Result<Vec<u8>> {
        let url = Url::parse(url)?;
        let mut response = check_status(self.http.get(url).send().await?).await?;

        if limit != 0 && response.content_length().is_some_and(|len| len > limit) {
            return Err(BcAuthError::BodyTooLarge { limit });
        }

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if limit != 0 && (data.len() + chunk.len()) as u64 > limit {
                return Err(BcAuthError::BodyTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        debug!(bytes = data.len(), "Blob downloaded");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn transport_for(server: &MockServer) -> XrpcTransport {
        let config = BcAuthConfig::custom(&server.uri()).unwrap();
        XrpcTransport::new(&config).unwrap()
    }

    fn grant_body() -> serde_json::Value {
        serde_json::json!({
            "accessJwt": "access.jwt.sig",
            "refreshJwt": "refresh.jwt.sig",
            "handle": "alice.test",
            "did": "did:plc:alice"
        })
    }

    #[tokio::test]
    async fn test_describe_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/com.atproto.server.describeServer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "did": "did:web:pds.test",
                "availableUserDomains": [".test"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        transport_for(&server).await.describe_server().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_session_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .and(body_json(serde_json::json!({
                "identifier": "alice.test",
                "password": "abcd-efgh-ijkl-mnop"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant_body()))
            .mount(&server)
            .await;

        let grant = transport_for(&server)
            .await
            .create_session("alice.test", "abcd-efgh-ijkl-mnop")
            .await
            .unwrap();

        assert_eq!(grant.handle, "alice.test");
        assert_eq!(grant.did, "did:plc:alice");
        assert_eq!(grant.access_jwt.as_str(), "access.jwt.sig");
    }

    #[tokio::test]
    async fn test_create_session_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "AuthenticationRequired",
                "message": "Invalid identifier or password"
            })))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .await
            .create_session("alice.test", "wrong")
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!err.is_master_credentials());
        assert!(err.to_string().contains("Invalid identifier or password"));
    }

    #[tokio::test]
    async fn test_refresh_session_uses_refresh_token_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.refreshSession"))
            .and(header("Authorization", "Bearer refresh.jwt.sig"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant_body()))
            .expect(1)
            .mount(&server)
            .await;

        let auth = AuthInfo {
            access_jwt: "refresh.jwt.sig".to_string().into(),
            refresh_jwt: "refresh.jwt.sig".to_string().into(),
            handle: "alice.test".to_string(),
            did: "did:plc:alice".to_string(),
        };

        let grant = transport_for(&server)
            .await
            .refresh_session(&auth)
            .await
            .unwrap();
        assert_eq!(grant.refresh_jwt.as_str(), "refresh.jwt.sig");
    }

    #[tokio::test]
    async fn test_query_maps_xrpc_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.graph.getFollowers"))
            .and(query_param("actor", "did:plc:alice"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "InvalidRequest",
                "message": "Profile not found"
            })))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .await
            .query(
                None,
                "app.bsky.graph.getFollowers",
                &[("actor", "did:plc:alice".to_string()), ("limit", "100".to_string())],
            )
            .await
            .unwrap_err();

        assert!(err.is_transport());
        match err {
            BcAuthError::Xrpc { status, error, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(error, "InvalidRequest");
                assert_eq!(message, "Profile not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_blob_respects_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/avatar.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .mount(&server)
            .await;

        let transport = transport_for(&server).await;
        let url = format!("{}/img/avatar.jpg", server.uri());

        let data = transport.fetch_blob(&url, 0).await.unwrap();
        assert_eq!(data.len(), 1024);

        let err = transport.fetch_blob(&url, 100).await.unwrap_err();
        assert!(matches!(err, BcAuthError::BodyTooLarge { limit: 100 }));
    }
}
