//! Payloads returned by the Tumblr v2 API
//!
//! Only the fields the sync consumes are declared; everything else in the
//! responses is ignored.

use serde::{Deserialize, Deserializer};

/// Common response envelope
///
/// Error responses carry `"response": []`, so the body is decoded only
/// after `meta` says the call succeeded.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub meta: Meta,
    #[serde(default)]
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Meta {
    pub status: u16,
    #[serde(default)]
    pub msg: String,
}

/// `GET /blog/{blog}/posts` payload
#[derive(Debug, Deserialize)]
pub(crate) struct PostsResponse {
    #[serde(default)]
    pub posts: Vec<RawPost>,
}

/// `GET /user/info` payload
#[derive(Debug, Deserialize)]
pub(crate) struct UserInfoResponse {
    pub user: RawAccountInfo,
}

/// A post as returned by the posts endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawPost {
    pub id: i64,
    pub post_url: String,
    #[serde(rename = "type")]
    pub post_type: String,
    pub timestamp: i64,
    /// "YYYY-MM-DD HH:MM:SS GMT"
    pub date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub note_count: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub mobile: Option<bool>,
    /// Present (even as null) only on reblogs
    #[serde(default, deserialize_with = "present")]
    pub reblogged_from_id: Option<serde_json::Value>,
}

impl RawPost {
    pub fn is_reblog(&self) -> bool {
        self.reblogged_from_id.is_some()
    }
}

/// Account info of the authenticated user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawAccountInfo {
    pub name: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub following: i64,
    #[serde(default)]
    pub blogs: Vec<RawBlog>,
}

/// One blog of the authenticated user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawBlog {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub posts: i64,
    #[serde(default)]
    pub avatar: Vec<AvatarVariant>,
}

/// One avatar size
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvatarVariant {
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    pub url: String,
}

/// Deserialize a field that is `Some` whenever the key is present
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}
