/// Graph XRPC endpoints
pub mod endpoints {
    pub const GET_PROFILE: &str = "app.bsky.actor.getProfile";
    pub const GET_FOLLOWERS: &str = "app.bsky.graph.getFollowers";
    pub const GET_FOLLOWS: &str = "app.bsky.graph.getFollows";
}

/// Largest page the graph endpoints hand out
pub const MAX_PAGE_SIZE: u32 = 100;

/// Users staged between the page fetcher and a slow consumer
pub const DEFAULT_STREAM_BUFFER: usize = 100;

/// Cap on the capacity pre-allocated from server reported counts
pub const MAX_PREALLOCATED_USERS: usize = 10_000;

/// Maximum avatar download before the image is rejected
pub const MAX_AVATAR_BYTES: u64 = 8 * 1024 * 1024;

/// Maximum banner download before the image is rejected
pub const MAX_BANNER_BYTES: u64 = 8 * 1024 * 1024;

/// Resolver tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Records requested per page, clamped to `1..=MAX_PAGE_SIZE`
    pub page_size: u32,

    /// Capacity of the channel feeding a stream consumer
    pub stream_buffer: usize,
}

impl GraphConfig {
    pub(crate) fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub(crate) fn effective_buffer(&self) -> usize {
        self.stream_buffer.max(1)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}
