//! Cursor paginated collection streaming.
//!
//! A resolve spawns one producer task that walks the server's pages and feeds
//! users into a bounded channel. The producer blocks when the consumer falls
//! behind and checks the cancellation token before every page fetch and
//! every hand-off, including while blocked on a full channel.

use std::pin::Pin;
use std::task::{Context, Poll};

use bc_auth::Client;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::{endpoints, GraphConfig, MAX_PREALLOCATED_USERS};
use crate::errors::{GraphError, Result};
use crate::models::{ProfileView, ProfileViewDetailed};
use crate::profile::{Profile, User};

/// A paginated user collection on the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Accounts following the actor
    Followers(String),
    /// Accounts the actor follows
    Follows(String),
}

impl Collection {
    pub fn actor(&self) -> &str {
        match self {
            Self::Followers(actor) | Self::Follows(actor) => actor,
        }
    }

    fn nsid(&self) -> &'static str {
        match self {
            Self::Followers(_) => endpoints::GET_FOLLOWERS,
            Self::Follows(_) => endpoints::GET_FOLLOWS,
        }
    }

    fn records_field(&self) -> &'static str {
        match self {
            Self::Followers(_) => "followers",
            Self::Follows(_) => "follows",
        }
    }
}

/// One decoded page
struct Page {
    users: Vec<User>,
    cursor: Option<String>,
}

/// Social graph queries on top of an authenticated [`Client`]
#[derive(Debug, Clone)]
pub struct Graph {
    client: Client,
    config: GraphConfig,
}

impl Graph {
    pub fn new(client: Client) -> Self {
        Self::with_config(client, GraphConfig::default())
    }

    pub fn with_config(client: Client, config: GraphConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Retrieve the metadata of a user.
    ///
    /// Accepts handles or DIDs, bare or prefixed with `@` or `at://`.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self, id: &str) -> Result<Profile> {
        let actor = normalize_actor(id);
        let body = self
            .client
            .query(endpoints::GET_PROFILE, &[("actor", actor.to_string())])
            .await?;

        let view: ProfileViewDetailed =
            serde_json::from_value(body).map_err(|e| GraphError::decode("profile", e))?;
        Ok(view.into())
    }

    pub(crate) async fn fetch_media(&self, url: &str, limit: u64) -> Result<Vec<u8>> {
        Ok(self.client.fetch_blob(url, limit).await?)
    }

    /// Drain a whole collection into memory.
    ///
    /// `expected_count` only sizes the initial allocation.
    pub async fn resolve_all(
        &self,
        collection: Collection,
        expected_count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<User>> {
        let mut stream = self.resolve_streaming(collection, cancel.clone());

        let mut users = Vec::with_capacity(expected_count.min(MAX_PREALLOCATED_USERS));
        while let Some(user) = stream.recv().await {
            users.push(user);
        }
        stream.finish().await?;

        Ok(users)
    }

    /// Stream a collection page by page.
    ///
    /// Users arrive in server order. Once the stream is exhausted,
    /// [`UserStream::finish`] reports whether the walk completed, failed, or
    /// was canceled through `cancel`.
    pub fn resolve_streaming(&self, collection: Collection, cancel: CancellationToken) -> UserStream {
        let (users_tx, users_rx) = mpsc::channel(self.config.effective_buffer());
        let (done_tx, done_rx) = oneshot::channel();

        let client = self.client.clone();
        let page_size = self.config.effective_page_size();

        tokio::spawn(async move {
            let result = produce(&client, &collection, page_size, users_tx, &cancel).await;
            match &result {
                Ok(()) => debug!(actor = collection.actor(), "Collection resolved"),
                Err(e) => debug!(actor = collection.actor(), error = %e, "Collection resolve stopped"),
            }
            // Receiver gone means the consumer no longer cares
            let _ = done_tx.send(result);
        });

        UserStream {
            users: users_rx,
            done: done_rx,
        }
    }
}

async fn produce(
    client: &Client,
    collection: &Collection,
    page_size: u32,
    users: mpsc::Sender<User>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cursor: Option<String> = None;

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Canceled),
            page = fetch_page(client, collection, cursor.as_deref(), page_size) => page?,
        };

        for user in page.users {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GraphError::Canceled),
                sent = users.send(user) => {
                    if sent.is_err() {
                        debug!(actor = collection.actor(), "Consumer dropped the stream");
                        return Ok(());
                    }
                }
            }
        }

        match page.cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(()),
        }
    }
}

async fn fetch_page(
    client: &Client,
    collection: &Collection,
    cursor: Option<&str>,
    page_size: u32,
) -> Result<Page> {
    let mut params = vec![
        ("actor", collection.actor().to_string()),
        ("limit", page_size.to_string()),
    ];
    if let Some(cursor) = cursor {
        params.push(("cursor", cursor.to_string()));
    }

    let mut body = client.query(collection.nsid(), &params).await?;

    let records = body
        .get_mut(collection.records_field())
        .map(serde_json::Value::take)
        .ok_or_else(|| {
            GraphError::Decode(format!("page is missing `{}`", collection.records_field()))
        })?;
    let views: Vec<ProfileView> =
        serde_json::from_value(records).map_err(|e| GraphError::decode("page records", e))?;

    let cursor = match body.get("cursor") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(next)) if next.is_empty() => {
            warn!(actor = collection.actor(), "Server sent an empty cursor, ending walk");
            None
        }
        Some(serde_json::Value::String(next)) => Some(next.clone()),
        Some(other) => return Err(GraphError::Decode(format!("invalid cursor: {other}"))),
    };

    debug!(
        actor = collection.actor(),
        records = views.len(),
        more = cursor.is_some(),
        "Fetched page"
    );
    Ok(Page {
        users: views.into_iter().map(User::from).collect(),
        cursor,
    })
}

/// Strip the `@` and `at://` prefixes the profile endpoint does not accept
fn normalize_actor(id: &str) -> &str {
    let id = id.strip_prefix('@').unwrap_or(id);
    id.strip_prefix("at://").unwrap_or(id)
}

/// Users of an in-progress resolve plus its final outcome
///
/// Single pass: a stream cannot be restarted. Dropping it stops the producer
/// at its next hand-off.
#[derive(Debug)]
pub struct UserStream {
    users: mpsc::Receiver<User>,
    done: oneshot::Receiver<Result<()>>,
}

impl UserStream {
    /// Next user, or `None` once the producer stopped
    pub async fn recv(&mut self) -> Option<User> {
        self.users.recv().await
    }

    /// Outcome of the walk. Unread users are discarded.
    pub async fn finish(self) -> Result<()> {
        let Self { users, done } = self;
        drop(users);
        done.await.unwrap_or(Err(GraphError::ProducerLost))
    }
}

impl Stream for UserStream {
    type Item = User;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<User>> {
        self.users.poll_recv(cx)
    }
}
