//! Profile service
//!
//! Read and edit the authenticated caller's user record.

use std::sync::Arc;

use crate::data::{Database, ProfilePatch, ProviderIdentity, User};
use crate::error::AppError;
use crate::metrics::PROFILE_UPDATES_TOTAL;

/// Profile service
pub struct ProfileService {
    db: Arc<Database>,
}

impl ProfileService {
    /// Create new profile service
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Get the user with `email`
    ///
    /// # Errors
    /// `UserNotFound` if reconciliation never created the record
    pub async fn get_profile(&self, email: &str) -> Result<User, AppError> {
        self.db
            .find_user_by_email(email)
            .await?
            .ok_or(AppError::UserNotFound)
    }

    /// Providers bound to `user_id`
    pub async fn linked_identities(&self, user_id: &str) -> Result<Vec<ProviderIdentity>, AppError> {
        self.db.get_identities_for_user(user_id).await
    }

    /// Update display name and bio
    ///
    /// Both fields are applied as given: `Some("")` stores an empty string
    /// and `None` clears the field.
    pub async fn update_profile(&self, email: &str, patch: ProfilePatch) -> Result<User, AppError> {
        let user = self
            .db
            .update_user_profile(email, &patch, chrono::Utc::now())
            .await?
            .ok_or(AppError::UserNotFound)?;

        PROFILE_UPDATES_TOTAL.inc();
        tracing::info!(user_id = %user.id, "Profile updated");

        Ok(user)
    }
}
