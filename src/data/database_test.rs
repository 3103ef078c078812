//! Database tests

use super::*;
use crate::error::AppError;
use crate::identity::{NormalizedIdentity, Provider, normalize};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn identity(provider: &str, claims: serde_json::Value) -> NormalizedIdentity {
    normalize(provider, claims.as_object().unwrap()).unwrap()
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert_eq!(db.count_users().await.unwrap(), 0);
    assert_eq!(db.count_provider_identities().await.unwrap(), 0);
}

#[tokio::test]
async fn test_link_identity_creates_user_and_identity() {
    let (db, _temp_dir) = create_test_db().await;
    let ann = identity(
        "google",
        json!({"sub": "123", "email": "a@x.com", "name": "Ann"}),
    );

    let outcome = db.link_identity(&ann, Utc::now()).await.unwrap();
    assert!(outcome.created_user);

    let user = db.get_user(&outcome.user_id).await.unwrap().unwrap();
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.display_name.as_deref(), Some("Ann"));
    assert_eq!(user.avatar_url, None);
    assert_eq!(user.bio, None);

    let link = db
        .find_provider_identity(Provider::Google, "123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.provider, "google");
    assert_eq!(link.user_id, outcome.user_id);
}

#[tokio::test]
async fn test_link_identity_reuses_user_with_same_email() {
    let (db, _temp_dir) = create_test_db().await;
    let google = identity("google", json!({"sub": "g-1", "email": "e@x.com", "name": "E"}));
    let github = identity(
        "github",
        json!({"id": 77, "login": "e", "email": "e@x.com", "name": "Other Name"}),
    );

    let first = db.link_identity(&google, Utc::now()).await.unwrap();
    let second = db.link_identity(&github, Utc::now()).await.unwrap();

    assert!(!second.created_user);
    assert_eq!(first.user_id, second.user_id);
    assert_eq!(db.count_users().await.unwrap(), 1);

    // Linking does not overwrite the existing user's fields.
    let user = db.get_user(&first.user_id).await.unwrap().unwrap();
    assert_eq!(user.display_name.as_deref(), Some("E"));

    let providers: Vec<String> = db
        .get_identities_for_user(&first.user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|link| link.provider)
        .collect();
    assert_eq!(providers.len(), 2);
    assert!(providers.contains(&"google".to_string()));
    assert!(providers.contains(&"github".to_string()));
}

#[tokio::test]
async fn test_duplicate_link_reports_race_and_commits_nothing() {
    let (db, _temp_dir) = create_test_db().await;
    let original = identity("github", json!({"id": 5, "login": "five"}));
    db.link_identity(&original, Utc::now()).await.unwrap();

    // Same subject, different email: the user insert would succeed on its own,
    // so the rollback must also discard it.
    let conflicting = identity(
        "github",
        json!({"id": 5, "login": "five", "email": "renamed@x.com"}),
    );
    let error = db.link_identity(&conflicting, Utc::now()).await.unwrap_err();

    assert!(matches!(error, AppError::UniqueConstraintRace));
    assert_eq!(db.count_users().await.unwrap(), 1);
    assert_eq!(db.count_provider_identities().await.unwrap(), 1);
    assert!(db.find_user_by_email("renamed@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_user_profile_writes_both_fields() {
    let (db, _temp_dir) = create_test_db().await;
    let ann = identity("google", json!({"sub": "1", "email": "a@x.com", "name": "Ann"}));
    let outcome = db.link_identity(&ann, Utc::now()).await.unwrap();
    let before = db.get_user(&outcome.user_id).await.unwrap().unwrap();

    let patch = ProfilePatch {
        display_name: Some(String::new()),
        bio: Some("Rustacean".to_string()),
    };
    let updated_at = before.updated_at + chrono::Duration::seconds(5);
    let updated = db
        .update_user_profile("a@x.com", &patch, updated_at)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.display_name.as_deref(), Some(""));
    assert_eq!(updated.bio.as_deref(), Some("Rustacean"));
    assert_eq!(updated.updated_at, updated_at);
    assert_eq!(updated.created_at, before.created_at);

    let missing = db
        .update_user_profile("nobody@x.com", &patch, Utc::now())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_refresh_user_attributes_skips_unchanged_rows() {
    let (db, _temp_dir) = create_test_db().await;
    let ann = identity(
        "google",
        json!({"sub": "1", "email": "a@x.com", "name": "Ann", "picture": "https://p/1"}),
    );
    let outcome = db.link_identity(&ann, Utc::now()).await.unwrap();

    let unchanged = db
        .refresh_user_attributes(&outcome.user_id, Some("Ann"), Some("https://p/1"), Utc::now())
        .await
        .unwrap();
    assert!(!unchanged);

    let changed = db
        .refresh_user_attributes(&outcome.user_id, Some("Ann B"), None, Utc::now())
        .await
        .unwrap();
    assert!(changed);

    let user = db.get_user(&outcome.user_id).await.unwrap().unwrap();
    assert_eq!(user.display_name.as_deref(), Some("Ann B"));
    assert_eq!(user.avatar_url.as_deref(), Some("https://p/1"));
}

#[tokio::test]
async fn test_list_users_in_creation_order() {
    let (db, _temp_dir) = create_test_db().await;
    let first = identity("google", json!({"sub": "1", "email": "first@x.com"}));
    let second = identity("github", json!({"id": 2, "login": "second"}));
    let now = Utc::now();

    db.link_identity(&first, now).await.unwrap();
    db.link_identity(&second, now + chrono::Duration::seconds(1))
        .await
        .unwrap();

    let emails: Vec<String> = db
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.email)
        .collect();
    assert_eq!(
        emails,
        vec!["first@x.com", "second@users.noreply.github.com"]
    );
}
