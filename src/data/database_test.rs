//! Database tests

use super::*;
use chrono::NaiveDate;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn blog_upsert(account_id: &str, uuid: &str, name: &str) -> BlogUpsert {
    BlogUpsert {
        account_id: account_id.to_string(),
        uuid: uuid.to_string(),
        blog_name: name.to_string(),
        title: format!("{} title", name),
        is_primary: true,
        avatar: None,
        followers: 10,
        posts: 3,
    }
}

fn post_upsert(id: i64, blog_id: &str, note_count: i64, timestamp: i64) -> PostUpsert {
    PostUpsert {
        id,
        blog_id: blog_id.to_string(),
        post_url: format!("https://example.tumblr.com/post/{}/", id),
        post_type: PostType::Text,
        timestamp,
        date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
        mobile: false,
        is_reblog: false,
        note_count,
        title: Some(format!("Post {}", id)),
        summary: None,
        slug: None,
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_account_create_and_rename() {
    let (db, _temp_dir) = create_test_db().await;

    let account = db.create_account("oldname").await.unwrap();
    assert!(db.create_account("oldname").await.is_err());

    assert!(db.rename_account(&account.id, "newname").await.unwrap());
    let renamed = db.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(renamed.username, "newname");
    assert!(db.get_account_by_username("oldname").await.unwrap().is_none());

    assert!(!db.rename_account("missing", "whatever").await.unwrap());
}

#[tokio::test]
async fn test_rename_releases_stale_username() {
    let (db, _temp_dir) = create_test_db().await;

    let stale = db.create_account("handle").await.unwrap();
    let current = db.create_account("other").await.unwrap();

    db.rename_account(&current.id, "handle").await.unwrap();

    let stale = db.get_account(&stale.id).await.unwrap().unwrap();
    assert_eq!(stale.username, stale.id);
    let current = db.get_account(&current.id).await.unwrap().unwrap();
    assert_eq!(current.username, "handle");
}

#[tokio::test]
async fn test_credentials_upsert() {
    let (db, _temp_dir) = create_test_db().await;
    let account = db.create_account("writer").await.unwrap();

    assert!(db.get_credentials(&account.id).await.unwrap().is_none());
    assert!(db.list_accounts_with_credentials().await.unwrap().is_empty());

    db.store_credentials(&account.id, "token-1", "secret-1")
        .await
        .unwrap();
    db.store_credentials(&account.id, "token-2", "secret-2")
        .await
        .unwrap();

    let credentials = db.get_credentials(&account.id).await.unwrap().unwrap();
    assert_eq!(credentials.token, "token-2");
    assert_eq!(credentials.secret, "secret-2");
    assert!(!format!("{:?}", credentials).contains("secret-2"));

    let accounts = db.list_accounts_with_credentials().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, account.id);
}

#[tokio::test]
async fn test_blog_upsert_keyed_by_uuid() {
    let (db, _temp_dir) = create_test_db().await;
    let account = db.create_account("writer").await.unwrap();

    let first = db
        .upsert_blog(&blog_upsert(&account.id, "uuid-1", "writer"))
        .await
        .unwrap();

    let mut renamed = blog_upsert(&account.id, "uuid-1", "writer-renamed");
    renamed.followers = 99;
    let second = db.upsert_blog(&renamed).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.blog_name, "writer-renamed");
    assert_eq!(second.followers, 99);
    assert_eq!(db.list_blogs(&account.id).await.unwrap().len(), 1);
    assert!(db.get_blog_by_name("writer").await.unwrap().is_none());
}

#[tokio::test]
async fn test_blog_name_reassignment_keeps_names_unique() {
    let (db, _temp_dir) = create_test_db().await;
    let account = db.create_account("writer").await.unwrap();

    let old = db
        .upsert_blog(&blog_upsert(&account.id, "uuid-old", "handle"))
        .await
        .unwrap();
    let new = db
        .upsert_blog(&blog_upsert(&account.id, "uuid-new", "handle"))
        .await
        .unwrap();

    assert_ne!(old.id, new.id);
    let by_name = db.get_blog_by_name("handle").await.unwrap().unwrap();
    assert_eq!(by_name.uuid, "uuid-new");
    let released = db.get_blog_by_name("uuid-old").await.unwrap().unwrap();
    assert_eq!(released.id, old.id);
}

#[tokio::test]
async fn test_get_or_create_tag_is_deduplicated() {
    let (db, _temp_dir) = create_test_db().await;

    let first = db.get_or_create_tag("art").await.unwrap();
    let second = db.get_or_create_tag("art").await.unwrap();
    let other = db.get_or_create_tag("Art").await.unwrap();

    assert_eq!(first, second);
    assert_ne!(first.id, other.id);
    assert!(db.get_tag("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_upsert_replaces_tags() {
    let (db, _temp_dir) = create_test_db().await;
    let account = db.create_account("writer").await.unwrap();
    let blog = db
        .upsert_blog(&blog_upsert(&account.id, "uuid-1", "writer"))
        .await
        .unwrap();

    let a = db.get_or_create_tag("a").await.unwrap();
    let b = db.get_or_create_tag("b").await.unwrap();
    let c = db.get_or_create_tag("c").await.unwrap();

    let mut post = post_upsert(12345, &blog.id, 5, 100);
    db.upsert_post_with_tags(&post, &[a.id, b.id]).await.unwrap();
    assert_eq!(db.get_post_tags(12345).await.unwrap(), vec!["a", "b"]);

    post.note_count = 8;
    db.upsert_post_with_tags(&post, &[b.id, c.id]).await.unwrap();
    assert_eq!(db.get_post_tags(12345).await.unwrap(), vec!["b", "c"]);

    let stored = db.get_post(12345).await.unwrap().unwrap();
    assert_eq!(stored.note_count, 8);
    assert_eq!(db.count_posts(&blog.id).await.unwrap(), 1);
    assert!(db.get_tag("a").await.unwrap().is_some());
}

#[tokio::test]
async fn test_top_posts_and_note_series() {
    let (db, _temp_dir) = create_test_db().await;
    let account = db.create_account("writer").await.unwrap();
    let blog = db
        .upsert_blog(&blog_upsert(&account.id, "uuid-1", "writer"))
        .await
        .unwrap();

    db.upsert_post_with_tags(&post_upsert(1, &blog.id, 10, 300), &[])
        .await
        .unwrap();
    db.upsert_post_with_tags(&post_upsert(2, &blog.id, 30, 100), &[])
        .await
        .unwrap();
    let mut reblog = post_upsert(3, &blog.id, 50, 200);
    reblog.is_reblog = true;
    db.upsert_post_with_tags(&reblog, &[]).await.unwrap();

    let top = db.get_top_posts(&blog.id, 5, true).await.unwrap();
    assert_eq!(top.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);

    let top = db.get_top_posts(&blog.id, 2, false).await.unwrap();
    assert_eq!(top.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 2]);

    assert_eq!(db.get_note_series(&blog.id, false).await.unwrap(), vec![30, 50, 10]);
    assert_eq!(db.get_note_series(&blog.id, true).await.unwrap(), vec![30, 10]);
}

#[tokio::test]
async fn test_kv_set_if_absent_respects_expiry() {
    let (db, _temp_dir) = create_test_db().await;

    assert!(db.kv_set_if_absent("lock", "a", 1_000, 2_000).await.unwrap());
    assert!(!db.kv_set_if_absent("lock", "b", 1_500, 2_500).await.unwrap());
    assert_eq!(db.kv_expiry("lock", 1_500).await.unwrap(), Some(2_000));

    // Expired entries count as absent
    assert!(db.kv_set_if_absent("lock", "c", 2_000, 3_000).await.unwrap());
    assert!(!db.kv_delete_if_equals("lock", "a").await.unwrap());
    assert!(db.kv_delete_if_equals("lock", "c").await.unwrap());
    assert_eq!(db.kv_expiry("lock", 2_000).await.unwrap(), None);
}

#[tokio::test]
async fn test_kv_set_overwrites_and_prunes() {
    let (db, _temp_dir) = create_test_db().await;

    db.kv_set("gate", "1", 5_000).await.unwrap();
    db.kv_set("gate", "1", 9_000).await.unwrap();
    assert_eq!(db.kv_expiry("gate", 6_000).await.unwrap(), Some(9_000));
    assert_eq!(db.kv_expiry("gate", 9_000).await.unwrap(), None);

    assert_eq!(db.kv_prune(10_000).await.unwrap(), 1);
}
