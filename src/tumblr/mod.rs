//! Tumblr API access
//!
//! - `BlogApi`: the two upstream calls a sync needs
//! - `TumblrClient`: reqwest implementation against the v2 API
//! - `oauth`: OAuth1 HMAC-SHA1 request signing with stored credentials

mod client;
mod dto;
pub mod oauth;

pub use client::TumblrClient;
pub use dto::{AvatarVariant, RawAccountInfo, RawBlog, RawPost};

use async_trait::async_trait;

use crate::data::Credentials;
use crate::error::AppError;

/// Upstream calls used by the sync job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlogApi: Send + Sync {
    /// One page of a blog's posts, newest first
    ///
    /// An empty page means the offset is past the last post.
    async fn fetch_posts_page(
        &self,
        blog_name: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RawPost>, AppError>;

    /// Account info of the user owning `credentials`, including its blogs
    async fn fetch_account_info(
        &self,
        credentials: &Credentials,
    ) -> Result<RawAccountInfo, AppError>;
}
