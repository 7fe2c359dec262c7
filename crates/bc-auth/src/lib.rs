//! Session management for Bluesky / AT Protocol clients
//!
//! This crate keeps a long-lived PDS session usable under concurrent use.
//!
//! # Session Lifecycle
//!
//! 1. `dial` probes the server with `com.atproto.server.describeServer`
//! 2. `login` creates a session from a handle and an **app password**; master
//!    passwords are detected from the token scope and refused
//! 3. Before every authenticated call the access token's remaining validity
//!    is checked:
//!    - more than 5 minutes left: nothing happens
//!    - 2 to 5 minutes left: a single background refresh is started and the
//!      call proceeds immediately
//!    - less than 2 minutes left: the call waits for a refresh; concurrent
//!      callers queue behind one network request
//!    - refresh token expired: the call fails with `SessionExpired`
//! 4. A background checker repeats the same decision every minute so idle
//!    clients stay logged in
//! 5. `close` stops the checker and forgets the credentials
//!
//! # Example
//!
//! ```no_run
//! use bc_auth::{BcAuthConfig, Client};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::dial(BcAuthConfig::bsky_social()).await?;
//!     let session = client.login("alice.bsky.social", "abcd-efgh-ijkl-mnop").await?;
//!     println!("Logged in as: {} ({})", session.handle, session.did);
//!
//!     // Calls the crate does not wrap
//!     let me = client
//!         .custom_call(|call| async move {
//!             call.query("com.atproto.server.getSession", &[]).await
//!         })
//!         .await?;
//!     println!("{me}");
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Important Notes
//!
//! - Token claims are read without verifying signatures; the tokens come from
//!   the PDS and only ever go back to it
//! - Credentials live in memory only and are zeroized on drop
//! - Tokens are never logged

pub mod client;
pub mod config;
pub mod errors;
pub mod jwt;
pub mod lifecycle;
pub mod models;
pub mod session;
pub mod transport;
pub mod xrpc;

// Re-export main types
pub use client::{Client, RawCall};
pub use config::{BcAuthConfig, HttpTimeouts, RefreshPolicy, SERVER_BSKY_SOCIAL};
pub use errors::{BcAuthError, Result};
pub use jwt::{TokenClaims, TokenDecoder, UnverifiedJwtDecoder};
pub use lifecycle::RefreshHook;
pub use models::SessionGrant;
pub use session::{AuthInfo, Credentials, SessionState};
pub use transport::Transport;
pub use xrpc::XrpcTransport;
