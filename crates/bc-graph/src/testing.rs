//! In-memory PDS serving a synthetic social graph

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bc_auth::{AuthInfo, BcAuthError, Client, RefreshPolicy, SessionGrant, Transport};
use chrono::Utc;
use serde_json::{Value, json};

use crate::config::endpoints;
use crate::resolver::Graph;

const BLOB_SIZE: usize = 512;

fn fake_jwt(exp: i64, scope: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256K","typ":"at+jwt"}"#);
    let payload = URL_SAFE_NO_PAD
        .encode(json!({ "exp": exp, "scope": scope, "sub": "did:plc:tester" }).to_string());
    format!("{header}.{payload}.c2ln")
}

#[derive(Default)]
struct State {
    followers: usize,
    follows: usize,
    images: bool,
    failing_page: Option<usize>,
    malformed_page: Option<usize>,
    stale_login: bool,
    refresh_delay: Duration,
    refreshes: AtomicUsize,
    page_fetches: AtomicUsize,
    blob_fetches: AtomicUsize,
    last_actor: Mutex<String>,
}

/// Cloneable handle; clones observe the same counters
#[derive(Clone)]
pub(crate) struct FakeServer {
    state: Arc<State>,
}

impl FakeServer {
    pub(crate) fn with_followers(count: usize) -> Self {
        Self {
            state: Arc::new(State {
                followers: count,
                ..Default::default()
            }),
        }
    }

    fn edit(mut self, f: impl FnOnce(&mut State)) -> Self {
        f(Arc::get_mut(&mut self.state).expect("configure before sharing"));
        self
    }

    pub(crate) fn with_follows(self, count: usize) -> Self {
        self.edit(|s| s.follows = count)
    }

    pub(crate) fn with_images(self) -> Self {
        self.edit(|s| s.images = true)
    }

    /// Zero-based page index answered with a transport failure
    pub(crate) fn failing_page(self, page: usize) -> Self {
        self.edit(|s| s.failing_page = Some(page))
    }

    /// Zero-based page index answered with an undecodable record list
    pub(crate) fn malformed_page(self, page: usize) -> Self {
        self.edit(|s| s.malformed_page = Some(page))
    }

    /// Login hands out an access token that is due for a blocking refresh,
    /// and each refresh takes `delay` to answer
    pub(crate) fn with_stale_login(self, delay: Duration) -> Self {
        self.edit(|s| {
            s.stale_login = true;
            s.refresh_delay = delay;
        })
    }

    /// Refreshes that ran to completion
    pub(crate) fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn page_fetches(&self) -> usize {
        self.state.page_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn blob_fetches(&self) -> usize {
        self.state.blob_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn last_actor(&self) -> String {
        self.state.last_actor.lock().unwrap().clone()
    }

    fn grant(&self, access_ttl: i64) -> SessionGrant {
        let now = Utc::now().timestamp();
        SessionGrant {
            access_jwt: fake_jwt(now + access_ttl, "com.atproto.appPass").into(),
            refresh_jwt: fake_jwt(now + 90 * 86400, "com.atproto.refresh").into(),
            handle: "tester.bsky.social".to_string(),
            did: "did:plc:tester".to_string(),
        }
    }

    fn profile(&self) -> Value {
        let mut profile = json!({
            "did": "did:plc:tester",
            "handle": "tester.bsky.social",
            "displayName": "bsky-client tester",
            "description": "",
            "followersCount": self.state.followers,
            "followsCount": self.state.follows,
            "postsCount": 42,
        });
        if self.state.images {
            profile["avatar"] = json!("https://cdn.test/avatar/tester.jpg");
            profile["banner"] = json!("https://cdn.test/banner/tester.jpg");
        }
        profile
    }

    fn page(
        &self,
        field: &str,
        prefix: &str,
        total: usize,
        params: &[(&str, String)],
    ) -> bc_auth::Result<Value> {
        let page_index = self.state.page_fetches.fetch_add(1, Ordering::SeqCst);
        if self.state.failing_page == Some(page_index) {
            return Err(BcAuthError::Transport("connection reset".to_string()));
        }

        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        };
        let start: usize = param("cursor").and_then(|c| c.parse().ok()).unwrap_or(0);
        let limit: usize = param("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
        let end = (start + limit).min(total);

        let records: Vec<Value> = (start..end)
            .map(|i| {
                json!({
                    "did": format!("did:plc:{prefix}-{i}"),
                    "handle": format!("{prefix}-{i}.test"),
                })
            })
            .collect();

        let mut body = json!({ "subject": self.profile() });
        body[field] = Value::Array(records);
        if self.state.malformed_page == Some(page_index) {
            body[field] = json!([{ "did": 7 }]);
        }
        if end < total {
            body["cursor"] = json!(end.to_string());
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Transport for FakeServer {
    async fn describe_server(&self) -> bc_auth::Result<()> {
        Ok(())
    }

    async fn create_session(&self, _identifier: &str, _secret: &str) -> bc_auth::Result<SessionGrant> {
        let ttl = if self.state.stale_login { 60 } else { 2 * 3600 };
        Ok(self.grant(ttl))
    }

    async fn refresh_session(&self, _auth: &AuthInfo) -> bc_auth::Result<SessionGrant> {
        tokio::time::sleep(self.state.refresh_delay).await;
        self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.grant(2 * 3600))
    }

    async fn query(
        &self,
        _auth: Option<&AuthInfo>,
        nsid: &str,
        params: &[(&str, String)],
    ) -> bc_auth::Result<Value> {
        if let Some((_, actor)) = params.iter().find(|(key, _)| *key == "actor") {
            *self.state.last_actor.lock().unwrap() = actor.clone();
        }

        match nsid {
            endpoints::GET_PROFILE => Ok(self.profile()),
            endpoints::GET_FOLLOWERS => self.page("followers", "user", self.state.followers, params),
            endpoints::GET_FOLLOWS => self.page("follows", "follow", self.state.follows, params),
            other => Err(BcAuthError::Transport(format!("unexpected method {other}"))),
        }
    }

    async fn fetch_blob(&self, _url: &str, limit: u64) -> bc_auth::Result<Vec<u8>> {
        self.state.blob_fetches.fetch_add(1, Ordering::SeqCst);
        if limit != 0 && BLOB_SIZE as u64 > limit {
            return Err(BcAuthError::BodyTooLarge { limit });
        }
        Ok(vec![0xAB; BLOB_SIZE])
    }
}

pub(crate) async fn logged_in_client(server: FakeServer) -> (Client, FakeServer) {
    let client = Client::with_transport(Arc::new(server.clone()), RefreshPolicy::default());
    client.login("tester.bsky.social", "app-pass").await.unwrap();
    (client, server)
}

pub(crate) async fn logged_in_graph(server: FakeServer) -> (Graph, FakeServer) {
    let (client, server) = logged_in_client(server).await;
    (Graph::new(client), server)
}
