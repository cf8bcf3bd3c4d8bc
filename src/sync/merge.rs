//! Merge engine
//!
//! Reconciles fetched records into storage. Every write is an upsert keyed
//! by an external identifier, so merging the same input twice leaves the
//! store unchanged after the first pass.

use std::sync::Arc;

use chrono::NaiveDateTime;

use super::fetcher::AccountInfo;
use crate::data::{
    Account, Blog, BlogUpsert, Database, PostType, PostUpsert, SLUG_MAX_CHARS, SUMMARY_MAX_CHARS,
    TITLE_MAX_CHARS, shorten,
};
use crate::error::AppError;
use crate::metrics::POSTS_MERGED_TOTAL;
use crate::tumblr::RawPost;

/// Upstream publish date format
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S GMT";

/// Result of merging account info
#[derive(Debug, Clone)]
pub struct MergedAccount {
    /// Account after the rename to its primary blog name
    pub account: Account,
    pub primary: Blog,
    pub blogs: Vec<Blog>,
    /// Username before the merge, if it changed
    pub previous_username: Option<String>,
}

/// Strip the slug from a post permalink
///
/// `https://b.tumblr.com/post/12345/some-slug` becomes
/// `https://b.tumblr.com/post/12345/`. Anything else is returned unchanged.
pub fn normalize_post_url(url: &str) -> String {
    let Some(marker) = url.rfind("/post/") else {
        return url.to_string();
    };
    let id_start = marker + "/post/".len();
    let rest = &url[id_start..];

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return url.to_string();
    }

    let after_id = &rest[digits..];
    match after_id.strip_prefix('/') {
        Some(slug) if !slug.is_empty() && !slug.contains('/') => {
            url[..id_start + digits + 1].to_string()
        }
        _ => url.to_string(),
    }
}

/// Build the stored row for one fetched post
fn post_upsert(blog_id: &str, raw: &RawPost) -> Result<PostUpsert, AppError> {
    let post_type = PostType::parse(&raw.post_type).ok_or_else(|| {
        AppError::Upstream(format!(
            "post {} has unknown type {:?}",
            raw.id, raw.post_type
        ))
    })?;

    let published = NaiveDateTime::parse_from_str(&raw.date, DATE_FORMAT).map_err(|e| {
        AppError::Upstream(format!(
            "post {} has malformed date {:?}: {}",
            raw.id, raw.date, e
        ))
    })?;

    Ok(PostUpsert {
        id: raw.id,
        blog_id: blog_id.to_string(),
        post_url: normalize_post_url(&raw.post_url),
        post_type,
        timestamp: raw.timestamp,
        date: published.date(),
        mobile: raw.mobile.unwrap_or(false),
        is_reblog: raw.is_reblog(),
        note_count: raw.note_count,
        title: raw.title.as_deref().map(|t| shorten(t, TITLE_MAX_CHARS)),
        summary: raw.summary.as_deref().map(|s| shorten(s, SUMMARY_MAX_CHARS)),
        slug: raw.slug.as_deref().map(|s| shorten(s, SLUG_MAX_CHARS)),
    })
}

/// Writes fetched blogs and posts
#[derive(Clone)]
pub struct MergeEngine {
    db: Arc<Database>,
}

impl MergeEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Upsert every blog of the account and follow the primary blog's name
    ///
    /// Exactly one primary is expected. With none, all blogs are still
    /// stored and `InconsistentAccount` is returned. With several, the
    /// first one wins and the rest are stored as non-primary.
    pub async fn merge_blog_info(
        &self,
        account: &Account,
        info: &AccountInfo,
    ) -> Result<MergedAccount, AppError> {
        let mut blogs = Vec::with_capacity(info.blogs.len());
        let mut primary: Option<Blog> = None;

        for entry in &info.blogs {
            let is_primary = entry.is_primary && primary.is_none();
            if entry.is_primary && !is_primary {
                tracing::warn!(
                    account_id = %account.id,
                    blog = %entry.name,
                    "Account has more than one primary blog; keeping the first"
                );
            }

            let blog = self
                .db
                .upsert_blog(&BlogUpsert {
                    account_id: account.id.clone(),
                    uuid: entry.uuid.clone(),
                    blog_name: entry.name.clone(),
                    title: entry.title.clone(),
                    is_primary,
                    avatar: entry.avatar.clone(),
                    followers: entry.followers,
                    posts: entry.posts,
                })
                .await?;

            if is_primary {
                primary = Some(blog.clone());
            }
            blogs.push(blog);
        }

        let Some(primary) = primary else {
            return Err(AppError::InconsistentAccount(format!(
                "account {} has {} blogs and none is primary",
                account.id,
                info.blogs.len()
            )));
        };

        let previous_username = if account.username != primary.blog_name {
            self.db.rename_account(&account.id, &primary.blog_name).await?;
            tracing::info!(
                account_id = %account.id,
                from = %account.username,
                to = %primary.blog_name,
                "Account renamed to follow its primary blog"
            );
            Some(account.username.clone())
        } else {
            None
        };

        let account = self
            .db
            .get_account(&account.id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(MergedAccount {
            account,
            primary,
            blogs,
            previous_username,
        })
    }

    /// Upsert fetched posts into `blog`
    ///
    /// Every record is validated before the first write. Each post's tag
    /// links are replaced by the tags of this pass.
    ///
    /// # Returns
    /// Number of posts written
    pub async fn merge_posts(&self, blog: &Blog, posts: &[RawPost]) -> Result<usize, AppError> {
        let rows = posts
            .iter()
            .map(|raw| post_upsert(&blog.id, raw))
            .collect::<Result<Vec<_>, _>>()?;

        for (row, raw) in rows.iter().zip(posts) {
            let mut tag_ids = Vec::with_capacity(raw.tags.len());
            for name in &raw.tags {
                tag_ids.push(self.db.get_or_create_tag(name).await?.id);
            }
            self.db.upsert_post_with_tags(row, &tag_ids).await?;
        }

        POSTS_MERGED_TOTAL.inc_by(rows.len() as u64);
        tracing::debug!(blog = %blog.blog_name, count = rows.len(), "Merged posts");
        Ok(rows.len())
    }
}
