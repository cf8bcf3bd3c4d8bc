//! External fetcher
//!
//! Pages through a blog's posts and reads account info through a
//! [`BlogApi`].

use std::sync::Arc;

use crate::config::TumblrConfig;
use crate::data::Credentials;
use crate::error::AppError;
use crate::tumblr::{AvatarVariant, BlogApi, RawAccountInfo, RawPost};

/// Account info with avatars resolved
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    pub name: String,
    pub likes: i64,
    pub following: i64,
    pub blogs: Vec<BlogInfo>,
}

/// One blog of an account
#[derive(Debug, Clone, PartialEq)]
pub struct BlogInfo {
    pub name: String,
    pub uuid: String,
    pub title: String,
    pub avatar: Option<String>,
    pub is_primary: bool,
    pub posts: i64,
    pub followers: i64,
}

impl AccountInfo {
    fn from_raw(raw: RawAccountInfo, avatar_size: u32) -> Self {
        Self {
            name: raw.name,
            likes: raw.likes,
            following: raw.following,
            blogs: raw
                .blogs
                .into_iter()
                .map(|blog| BlogInfo {
                    avatar: select_avatar(&blog.avatar, avatar_size),
                    name: blog.name,
                    uuid: blog.uuid,
                    title: blog.title,
                    is_primary: blog.primary,
                    posts: blog.posts,
                    followers: blog.followers,
                })
                .collect(),
        }
    }
}

/// URL of the avatar variant exactly `width` pixels wide
///
/// No nearest-size fallback.
pub fn select_avatar(variants: &[AvatarVariant], width: u32) -> Option<String> {
    variants
        .iter()
        .find(|variant| variant.width == width)
        .map(|variant| variant.url.clone())
}

/// Paginating reader over the upstream API
#[derive(Clone)]
pub struct Fetcher {
    api: Arc<dyn BlogApi>,
    page_size: u32,
    max_pages: Option<u32>,
    avatar_size: u32,
}

impl Fetcher {
    pub fn new(api: Arc<dyn BlogApi>, config: &TumblrConfig) -> Self {
        Self {
            api,
            page_size: config.page_size,
            max_pages: config.max_pages,
            avatar_size: config.avatar_size,
        }
    }

    /// Fetch every post of a blog
    ///
    /// Requests pages of `page_size` at increasing offsets until a page
    /// comes back empty. With `max_pages` set, stops after that many pages
    /// and logs a warning.
    pub async fn fetch_all_posts(&self, blog_name: &str) -> Result<Vec<RawPost>, AppError> {
        let mut posts = Vec::new();
        let mut offset: u32 = 0;
        let mut pages: u32 = 0;

        loop {
            if let Some(max_pages) = self.max_pages {
                if pages >= max_pages {
                    tracing::warn!(
                        blog = %blog_name,
                        pages,
                        fetched = posts.len(),
                        "Page cap reached before an empty page; stopping pagination"
                    );
                    break;
                }
            }

            let page = self
                .api
                .fetch_posts_page(blog_name, self.page_size, offset)
                .await?;
            pages += 1;

            if page.is_empty() {
                break;
            }

            posts.extend(page);
            offset = offset.saturating_add(self.page_size);
        }

        tracing::debug!(blog = %blog_name, pages, fetched = posts.len(), "Fetched all posts");
        Ok(posts)
    }

    /// Fetch account info for the owner of `credentials`
    pub async fn fetch_account_info(
        &self,
        credentials: &Credentials,
    ) -> Result<AccountInfo, AppError> {
        let raw = self.api.fetch_account_info(credentials).await?;
        Ok(AccountInfo::from_raw(raw, self.avatar_size))
    }
}
