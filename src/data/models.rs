//! Data models
//!
//! Rust structs representing database entities and query results.
//! Local IDs use ULID; post IDs are the external numeric IDs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Account
// =============================================================================

/// A local account linked to one Tumblr user
///
/// `username` follows the user's primary blog name and changes when the
/// blog is renamed upstream.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// OAuth1 access token pair stored for an account
#[derive(Clone, sqlx::FromRow)]
pub struct Credentials {
    pub account_id: String,
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Blog
// =============================================================================

/// One externally hosted blog owned by an account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Blog {
    pub id: String,
    pub account_id: String,
    /// Stable external identifier
    pub uuid: String,
    /// Current external name, may be reassigned upstream
    pub blog_name: String,
    pub title: String,
    pub is_primary: bool,
    pub avatar: Option<String>,
    pub followers: i64,
    pub posts: i64,
    /// Last refresh time
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Post
// =============================================================================

/// Post content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Quote,
    Link,
    Answer,
    Video,
    Audio,
    Photo,
    Chat,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Quote => "quote",
            Self::Link => "link",
            Self::Answer => "answer",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Photo => "photo",
            Self::Chat => "chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "quote" => Some(Self::Quote),
            "link" => Some(Self::Link),
            "answer" => Some(Self::Answer),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "photo" => Some(Self::Photo),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// A mirrored post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    /// External numeric ID, also the local primary key
    pub id: i64,
    pub blog_id: String,
    /// Canonical URL without the trailing slug
    pub post_url: String,
    /// Stored as the lowercase type name
    pub post_type: String,
    /// Publish time as Unix seconds
    pub timestamp: i64,
    /// Publish date (UTC)
    pub date: NaiveDate,
    pub mobile: bool,
    pub is_reblog: bool,
    pub note_count: i64,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub slug: Option<String>,
}

impl Post {
    /// Human readable label: title, else shortened summary
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.is_empty()) {
            return shorten(summary, 40);
        }
        "Unnamed post".to_string()
    }
}

/// Tag label, deduplicated by exact name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Write models
// =============================================================================

/// Blog fields written by the merge engine
#[derive(Debug, Clone)]
pub struct BlogUpsert {
    pub account_id: String,
    pub uuid: String,
    pub blog_name: String,
    pub title: String,
    pub is_primary: bool,
    pub avatar: Option<String>,
    pub followers: i64,
    pub posts: i64,
}

/// Post fields written by the merge engine
#[derive(Debug, Clone, PartialEq)]
pub struct PostUpsert {
    pub id: i64,
    pub blog_id: String,
    pub post_url: String,
    pub post_type: PostType,
    pub timestamp: i64,
    pub date: NaiveDate,
    pub mobile: bool,
    pub is_reblog: bool,
    pub note_count: i64,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub slug: Option<String>,
}

// =============================================================================
// Query results
// =============================================================================

/// Entry of the top posts listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPost {
    pub title: String,
    pub note_count: i64,
    pub url: String,
}

/// Storage limits for post text columns
pub const TITLE_MAX_CHARS: usize = 255;
pub const SLUG_MAX_CHARS: usize = 255;
pub const SUMMARY_MAX_CHARS: usize = 1000;

/// Fit `value` into `max_chars` characters
///
/// Longer values are cut and end in "...", which counts toward the limit.
pub fn shorten(value: &str, max_chars: usize) -> String {
    if value.char_indices().nth(max_chars).is_none() {
        return value.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let end = value
        .char_indices()
        .nth(keep)
        .map_or(value.len(), |(byte_index, _)| byte_index);
    format!("{}...", &value[..end])
}
