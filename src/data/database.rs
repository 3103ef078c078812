//! SQLite database operations
//!
//! All database access goes through this module.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use super::models::*;
use crate::error::AppError;
use crate::identity::{NormalizedIdentity, Provider};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 8;

/// Result of binding a new provider identity to a local user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub user_id: String,
    /// `false` when an existing user with the same email was reused
    pub created_user: bool,
}

/// Database connection pool wrapper.
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

        // Writers queue on the busy timeout instead of failing with SQLITE_BUSY.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

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
    // Users
    // =========================================================================

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// All users, oldest first
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Overwrite display name and avatar with values from the provider
    ///
    /// `None` leaves the stored value untouched.
    ///
    /// # Returns
    /// `true` if a row changed
    pub async fn refresh_user_attributes(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = COALESCE(?, display_name),
                avatar_url = COALESCE(?, avatar_url),
                updated_at = ?
            WHERE id = ?
              AND (display_name IS NOT COALESCE(?, display_name)
                   OR avatar_url IS NOT COALESCE(?, avatar_url))
            "#,
        )
        .bind(display_name)
        .bind(avatar_url)
        .bind(updated_at)
        .bind(user_id)
        .bind(display_name)
        .bind(avatar_url)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Apply a profile patch to the user with `email`
    ///
    /// Both fields are written unconditionally.
    ///
    /// # Returns
    /// The updated user, or `None` if no user has that email
    pub async fn update_user_profile(
        &self,
        email: &str,
        patch: &ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, bio = ?, updated_at = ? WHERE email = ?",
        )
        .bind(&patch.display_name)
        .bind(&patch.bio)
        .bind(updated_at)
        .bind(email)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_user_by_email(email).await
    }

    // =========================================================================
    // Provider identities
    // =========================================================================

    pub async fn find_provider_identity(
        &self,
        provider: Provider,
        provider_user_id: &str,
    ) -> Result<Option<ProviderIdentity>, AppError> {
        let identity = sqlx::query_as::<_, ProviderIdentity>(
            "SELECT * FROM provider_identities WHERE provider = ? AND provider_user_id = ?",
        )
        .bind(provider.as_str())
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    pub async fn get_identities_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ProviderIdentity>, AppError> {
        let identities = sqlx::query_as::<_, ProviderIdentity>(
            "SELECT * FROM provider_identities WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(identities)
    }

    pub async fn count_provider_identities(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM provider_identities")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Bind a not-yet-seen provider identity to a user, in one transaction
    ///
    /// # Steps
    /// 1. Insert a user for the identity's email unless one exists
    /// 2. Resolve the user id by email (new or reused)
    /// 3. Insert the provider identity pointing at that user
    ///
    /// The transaction opens with a write so concurrent callers serialize on
    /// SQLite's writer lock instead of failing on a stale read snapshot.
    ///
    /// # Errors
    /// `UniqueConstraintRace` if the identity was bound by another caller
    /// first. Nothing from this call is committed in that case.
    pub async fn link_identity(
        &self,
        identity: &NormalizedIdentity,
        now: DateTime<Utc>,
    ) -> Result<LinkOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, avatar_url, bio, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(identity.email())
        .bind(identity.display_name())
        .bind(identity.avatar_url())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let created_user = inserted.rows_affected() == 1;

        let user_id = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE email = ?")
            .bind(identity.email())
            .fetch_one(&mut *tx)
            .await?;

        let linked = sqlx::query(
            r#"
            INSERT INTO provider_identities (id, provider, provider_user_id, user_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(EntityId::new().0)
        .bind(identity.provider().as_str())
        .bind(identity.provider_user_id())
        .bind(&user_id)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match linked {
            Ok(_) => {}
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                tx.rollback().await?;
                return Err(AppError::UniqueConstraintRace);
            }
            Err(error) => return Err(error.into()),
        }

        tx.commit().await?;

        Ok(LinkOutcome {
            user_id,
            created_user,
        })
    }
}
