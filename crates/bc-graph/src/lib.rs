//! Profiles and social graph traversal for Bluesky
//!
//! Built on an authenticated [`bc_auth::Client`]; every request goes through
//! the session's refresh logic.
//!
//! Follower and followee lists are paginated by the server. [`Graph`] walks
//! the pages in a background task and hands users over a bounded channel, so
//! a slow consumer slows the walk down instead of growing memory. Both the
//! collecting and the streaming variants take a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! ```no_run
//! use bc_auth::{BcAuthConfig, Client};
//! use bc_graph::Graph;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Client::dial(BcAuthConfig::bsky_social()).await?;
//! client.login("alice.bsky.social", "abcd-efgh-ijkl-mnop").await?;
//!
//! let graph = Graph::new(client.clone());
//! let profile = graph.fetch_profile("@bob.bsky.social").await?;
//!
//! let mut followers = profile.resolve_followers_streaming(&graph, CancellationToken::new());
//! while let Some(user) = followers.recv().await {
//!     println!("{user}");
//! }
//! followers.finish().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod models;
pub mod profile;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use config::GraphConfig;
pub use errors::{GraphError, Result};
pub use profile::{Profile, User};
pub use resolver::{Collection, Graph, UserStream};
