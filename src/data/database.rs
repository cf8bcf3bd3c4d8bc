//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with runtime-checked queries.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
///
/// Several processes may open the same file; every write that must be
/// exclusive is a single statement guarded by a unique key.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Create a local account
    ///
    /// # Errors
    /// Returns `Validation` if the username is already taken
    pub async fn create_account(&self, username: &str) -> Result<Account, AppError> {
        let now = Utc::now();
        let account = Account {
            id: EntityId::new().0,
            username: username.to_string(),
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, username, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(&account.username)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Validation(format!(
                "username {} is already taken",
                username
            )));
        }

        Ok(account)
    }

    /// Get account by ID
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Get account by username
    pub async fn get_account_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// Rename an account.
    ///
    /// A stale account still holding `username` gets its own ID as a
    /// placeholder name so the unique constraint holds.
    ///
    /// # Returns
    /// `true` if renamed, `false` if no matching account row exists.
    pub async fn rename_account(&self, account_id: &str, username: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE accounts SET username = id WHERE username = ? AND id <> ?")
            .bind(username)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE accounts SET username = ?, updated_at = ? WHERE id = ?")
            .bind(username)
            .bind(Utc::now())
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() == 1)
    }

    /// Accounts that have stored credentials, ordered by username
    pub async fn list_accounts_with_credentials(&self) -> Result<Vec<Account>, AppError> {
        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT a.* FROM accounts a
            JOIN credentials c ON c.account_id = a.id
            ORDER BY a.username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Store or replace the OAuth1 token pair for an account
    pub async fn store_credentials(
        &self,
        account_id: &str,
        token: &str,
        secret: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (account_id, token, secret, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE
            SET token = excluded.token, secret = excluded.secret, updated_at = excluded.updated_at
            "#,
        )
        .bind(account_id)
        .bind(token)
        .bind(secret)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get stored credentials for an account
    pub async fn get_credentials(&self, account_id: &str) -> Result<Option<Credentials>, AppError> {
        let credentials = sqlx::query_as::<_, Credentials>(
            "SELECT account_id, token, secret FROM credentials WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credentials)
    }

    // =========================================================================
    // Blogs
    // =========================================================================

    /// Insert or update a blog keyed by its external UUID
    ///
    /// If a different blog still holds `blog_name` (the handle was reassigned
    /// upstream), that blog is renamed to its UUID first.
    pub async fn upsert_blog(&self, blog: &BlogUpsert) -> Result<Blog, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE blogs SET blog_name = uuid WHERE blog_name = ? AND uuid <> ?")
            .bind(&blog.blog_name)
            .bind(&blog.uuid)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO blogs (
                id, account_id, uuid, blog_name, title, is_primary, avatar,
                followers, posts, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uuid) DO UPDATE SET
                account_id = excluded.account_id,
                blog_name = excluded.blog_name,
                title = excluded.title,
                is_primary = excluded.is_primary,
                avatar = excluded.avatar,
                followers = excluded.followers,
                posts = excluded.posts,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(EntityId::new().0)
        .bind(&blog.account_id)
        .bind(&blog.uuid)
        .bind(&blog.blog_name)
        .bind(&blog.title)
        .bind(blog.is_primary)
        .bind(&blog.avatar)
        .bind(blog.followers)
        .bind(blog.posts)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE uuid = ?")
            .bind(&blog.uuid)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(stored)
    }

    /// Get blog by its current name
    pub async fn get_blog_by_name(&self, blog_name: &str) -> Result<Option<Blog>, AppError> {
        let blog = sqlx::query_as::<_, Blog>("SELECT * FROM blogs WHERE blog_name = ?")
            .bind(blog_name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(blog)
    }

    /// Get an account's blog by name
    pub async fn get_account_blog(
        &self,
        account_id: &str,
        blog_name: &str,
    ) -> Result<Option<Blog>, AppError> {
        let blog = sqlx::query_as::<_, Blog>(
            "SELECT * FROM blogs WHERE account_id = ? AND blog_name = ?",
        )
        .bind(account_id)
        .bind(blog_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blog)
    }

    /// All blogs of an account, primary first
    pub async fn list_blogs(&self, account_id: &str) -> Result<Vec<Blog>, AppError> {
        let blogs = sqlx::query_as::<_, Blog>(
            "SELECT * FROM blogs WHERE account_id = ? ORDER BY is_primary DESC, blog_name",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(blogs)
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Get a tag by exact name, creating it on first sight
    pub async fn get_or_create_tag(&self, name: &str) -> Result<Tag, AppError> {
        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(tag)
    }

    /// Get tag by exact name
    pub async fn get_tag(&self, name: &str) -> Result<Option<Tag>, AppError> {
        let tag = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tag)
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Upsert a post keyed by its external ID and replace its tag links.
    ///
    /// Tag links not in `tag_ids` are removed; the tags themselves stay.
    pub async fn upsert_post_with_tags(
        &self,
        post: &PostUpsert,
        tag_ids: &[i64],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, blog_id, post_url, post_type, timestamp, date, mobile,
                is_reblog, note_count, title, summary, slug
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                blog_id = excluded.blog_id,
                post_url = excluded.post_url,
                post_type = excluded.post_type,
                timestamp = excluded.timestamp,
                date = excluded.date,
                mobile = excluded.mobile,
                is_reblog = excluded.is_reblog,
                note_count = excluded.note_count,
                title = excluded.title,
                summary = excluded.summary,
                slug = excluded.slug
            "#,
        )
        .bind(post.id)
        .bind(&post.blog_id)
        .bind(&post.post_url)
        .bind(post.post_type.as_str())
        .bind(post.timestamp)
        .bind(post.date)
        .bind(post.mobile)
        .bind(post.is_reblog)
        .bind(post.note_count)
        .bind(&post.title)
        .bind(&post.summary)
        .bind(&post.slug)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(post.id)
            .execute(&mut *tx)
            .await?;

        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(post.id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Get post by external ID
    pub async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Tag names linked to a post, sorted
    pub async fn get_post_tags(&self, post_id: i64) -> Result<Vec<String>, AppError> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT t.name FROM tags t
            JOIN post_tags pt ON pt.tag_id = t.id
            WHERE pt.post_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Number of posts stored for a blog
    pub async fn count_posts(&self, blog_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE blog_id = ?")
            .bind(blog_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Posts of a blog ordered by note count, highest first
    pub async fn get_top_posts(
        &self,
        blog_id: &str,
        limit: u32,
        exclude_reblogs: bool,
    ) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE blog_id = ? AND (? = 0 OR is_reblog = 0)
            ORDER BY note_count DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(blog_id)
        .bind(exclude_reblogs)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// Note counts of a blog's posts in publish order
    pub async fn get_note_series(
        &self,
        blog_id: &str,
        exclude_reblogs: bool,
    ) -> Result<Vec<i64>, AppError> {
        let notes = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT note_count FROM posts
            WHERE blog_id = ? AND (? = 0 OR is_reblog = 0)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(blog_id)
        .bind(exclude_reblogs)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    // =========================================================================
    // Expiring key-value entries
    // =========================================================================

    /// Expiry (Unix millis) of a live entry
    pub async fn kv_expiry(&self, key: &str, now_ms: i64) -> Result<Option<i64>, AppError> {
        let expires_at = sqlx::query_scalar::<_, i64>(
            "SELECT expires_at_ms FROM kv_entries WHERE key = ? AND expires_at_ms > ?",
        )
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expires_at)
    }

    /// Set an entry, overwriting any existing value and expiry
    pub async fn kv_set(&self, key: &str, value: &str, expires_at_ms: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value, expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set an entry only if it is absent or expired.
    ///
    /// Atomic at the SQL statement level, so concurrent callers in any
    /// process sharing the file see exactly one winner.
    ///
    /// # Returns
    /// `true` if this call stored the entry.
    pub async fn kv_set_if_absent(
        &self,
        key: &str,
        value: &str,
        now_ms: i64,
        expires_at_ms: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE
            SET value = excluded.value, expires_at_ms = excluded.expires_at_ms
            WHERE kv_entries.expires_at_ms <= ?
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete an entry only if it still holds `value`
    pub async fn kv_delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove expired entries
    pub async fn kv_prune(&self, now_ms: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at_ms <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
