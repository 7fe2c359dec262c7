use anyhow::{Context, Result};
use bc_auth::{BcAuthConfig, Client};
use bc_graph::Graph;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logs in with an app password and streams the followers of an account.
///
/// Environment:
/// - `BSKY_HANDLE`, `BSKY_APPKEY`: login credentials
/// - `BSKY_SERVER`: PDS base URL, defaults to bsky.social
/// - `BSKY_ACTOR`: account to inspect, defaults to the logged in one
#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let handle = std::env::var("BSKY_HANDLE").context("BSKY_HANDLE is not set")?;
    let app_key = std::env::var("BSKY_APPKEY").context("BSKY_APPKEY is not set")?;
    let config = match std::env::var("BSKY_SERVER") {
        Ok(server) => BcAuthConfig::custom(&server)?,
        Err(_) => BcAuthConfig::bsky_social(),
    };

    let client = Client::dial(config).await?;
    let session = client.login(&handle, &app_key).await?;
    info!(handle = %session.handle, did = %session.did, "Logged in");

    let result = show_followers(&client, std::env::var("BSKY_ACTOR").ok()).await;
    client.close().await;
    result
}

async fn show_followers(client: &Client, actor: Option<String>) -> Result<()> {
    let graph = Graph::new(client.clone());
    let actor = match actor {
        Some(actor) => actor,
        None => client
            .credentials()
            .await
            .map(|c| c.did)
            .context("session disappeared")?,
    };

    let mut profile = graph.fetch_profile(&actor).await?;
    if let Err(e) = profile.resolve_avatar(&graph).await {
        warn!(error = %e, "Avatar unavailable");
    }
    println!("{profile}");
    println!(
        "  {} followers, {} following, {} posts, avatar {} bytes",
        profile.follower_count,
        profile.followee_count,
        profile.post_count,
        profile.avatar.as_ref().map_or(0, Vec::len),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut followers = profile.resolve_followers_streaming(&graph, cancel);
    let mut seen = 0usize;
    while let Some(user) = followers.next().await {
        seen += 1;
        println!("{seen:>6}  {user}");
    }

    match followers.finish().await {
        Ok(()) => info!(seen, "Follower list complete"),
        Err(e) if e.is_canceled() => warn!(seen, "Interrupted"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
