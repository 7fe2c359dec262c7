use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::config::{MAX_AVATAR_BYTES, MAX_BANNER_BYTES};
use crate::errors::Result;
use crate::models::{ProfileView, ProfileViewDetailed};
use crate::resolver::{Collection, Graph, UserStream};

/// A user profile on a Bluesky server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// User-friendly, unstable identifier
    pub handle: String,
    /// Machine-friendly, stable identifier
    pub did: String,
    pub name: Option<String>,
    pub bio: Option<String>,

    /// CDN URL of the profile picture
    pub avatar_url: Option<String>,
    /// Raw avatar bytes, `None` until resolved
    pub avatar: Option<Vec<u8>>,

    /// CDN URL of the banner picture
    pub banner_url: Option<String>,
    /// Raw banner bytes, `None` until resolved
    pub banner: Option<Vec<u8>>,

    pub follower_count: u64,
    /// `None` until resolved
    pub followers: Option<Vec<User>>,
    pub followee_count: u64,
    /// `None` until resolved
    pub followees: Option<Vec<User>>,

    pub post_count: u64,
}

/// Summary of a user as listed in follower / followee pages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub handle: String,
    pub did: String,
    pub name: Option<String>,
    pub bio: Option<String>,

    pub avatar_url: Option<String>,
    /// Raw avatar bytes, `None` until resolved
    pub avatar: Option<Vec<u8>>,
}

impl From<ProfileViewDetailed> for Profile {
    fn from(view: ProfileViewDetailed) -> Self {
        Self {
            handle: view.handle,
            did: view.did,
            name: non_empty(view.display_name),
            bio: non_empty(view.description),
            avatar_url: non_empty(view.avatar),
            avatar: None,
            banner_url: non_empty(view.banner),
            banner: None,
            follower_count: view.followers_count.unwrap_or(0),
            followers: None,
            followee_count: view.follows_count.unwrap_or(0),
            followees: None,
            post_count: view.posts_count.unwrap_or(0),
        }
    }
}

impl From<ProfileView> for User {
    fn from(view: ProfileView) -> Self {
        Self {
            handle: view.handle,
            did: view.did,
            name: non_empty(view.display_name),
            bio: non_empty(view.description),
            avatar_url: non_empty(view.avatar),
            avatar: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Profile {
    /// Download the avatar into `self.avatar` with the default size cap.
    /// An unset avatar is a successful no-op.
    pub async fn resolve_avatar(&mut self, graph: &Graph) -> Result<()> {
        self.resolve_avatar_with_limit(graph, MAX_AVATAR_BYTES).await
    }

    /// Like [`Profile::resolve_avatar`] with a custom cap (`0` disables it)
    pub async fn resolve_avatar_with_limit(&mut self, graph: &Graph, limit: u64) -> Result<()> {
        if let Some(url) = &self.avatar_url {
            self.avatar = Some(graph.fetch_media(url, limit).await?);
        }
        Ok(())
    }

    pub async fn resolve_banner(&mut self, graph: &Graph) -> Result<()> {
        self.resolve_banner_with_limit(graph, MAX_BANNER_BYTES).await
    }

    pub async fn resolve_banner_with_limit(&mut self, graph: &Graph, limit: u64) -> Result<()> {
        if let Some(url) = &self.banner_url {
            self.banner = Some(graph.fetch_media(url, limit).await?);
        }
        Ok(())
    }

    /// Fetch the complete follower list into `self.followers`.
    ///
    /// Large accounts take many round trips; use
    /// [`Profile::resolve_followers_streaming`] for control over memory and
    /// interruption.
    pub async fn resolve_followers(
        &mut self,
        graph: &Graph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let expected = usize::try_from(self.follower_count).unwrap_or(usize::MAX);
        let followers = graph
            .resolve_all(Collection::Followers(self.did.clone()), expected, cancel)
            .await?;
        self.followers = Some(followers);
        Ok(())
    }

    /// Stream the follower list without storing it in the profile
    pub fn resolve_followers_streaming(
        &self,
        graph: &Graph,
        cancel: CancellationToken,
    ) -> UserStream {
        graph.resolve_streaming(Collection::Followers(self.did.clone()), cancel)
    }

    /// Fetch the complete list of accounts this profile follows into `self.followees`
    pub async fn resolve_followees(
        &mut self,
        graph: &Graph,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let expected = usize::try_from(self.followee_count).unwrap_or(usize::MAX);
        let followees = graph
            .resolve_all(Collection::Follows(self.did.clone()), expected, cancel)
            .await?;
        self.followees = Some(followees);
        Ok(())
    }

    pub fn resolve_followees_streaming(
        &self,
        graph: &Graph,
        cancel: CancellationToken,
    ) -> UserStream {
        graph.resolve_streaming(Collection::Follows(self.did.clone()), cancel)
    }
}

impl User {
    /// Download the avatar into `self.avatar` with the default size cap.
    /// An unset avatar is a successful no-op.
    pub async fn resolve_avatar(&mut self, graph: &Graph) -> Result<()> {
        self.resolve_avatar_with_limit(graph, MAX_AVATAR_BYTES).await
    }

    pub async fn resolve_avatar_with_limit(&mut self, graph: &Graph, limit: u64) -> Result<()> {
        if let Some(url) = &self.avatar_url {
            self.avatar = Some(graph.fetch_media(url, limit).await?);
        }
        Ok(())
    }
}

/// `handle (did)`, or `name (handle/did)` when a display name is set. Names
/// with characters outside printable ASCII are quoted and escaped so user
/// input cannot drive the terminal.
fn write_identity(
    f: &mut fmt::Formatter<'_>,
    name: Option<&str>,
    handle: &str,
    did: &str,
) -> fmt::Result {
    match name {
        None => write!(f, "{handle} ({did})"),
        Some(name) if name.chars().all(|c| (' '..='~').contains(&c)) => {
            write!(f, "{name} ({handle}/{did})")
        }
        Some(name) => write!(f, "{name:?} ({handle}/{did})"),
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(f, self.name.as_deref(), &self.handle, &self.did)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_identity(f, self.name.as_deref(), &self.handle, &self.did)
    }
}
