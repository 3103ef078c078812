//! Account reconciliation
//!
//! Maps a normalized provider identity to a local user id, creating the user
//! and the identity binding on first login.

use std::sync::Arc;

use crate::data::Database;
use crate::error::AppError;
use crate::identity::NormalizedIdentity;
use crate::metrics::{RECONCILE_RACES_TOTAL, RECONCILIATIONS_TOTAL, USERS_TOTAL};

/// Attempts before a lost unique-constraint race is reported as an error.
const MAX_ATTEMPTS: usize = 3;

/// How an identity was resolved to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Identity already bound to a user
    Existing,
    /// New identity bound to a user found by email
    LinkedByEmail,
    /// New identity and new user
    Created,
}

impl Resolution {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::LinkedByEmail => "linked_by_email",
            Self::Created => "created",
        }
    }
}

/// Account reconciler
pub struct AccountReconciler {
    db: Arc<Database>,
    refresh_profile_on_login: bool,
}

impl AccountReconciler {
    /// Create new reconciler
    ///
    /// # Arguments
    /// * `refresh_profile_on_login` - overwrite display name and avatar from
    ///   the provider when an already-bound identity logs in again
    pub fn new(db: Arc<Database>, refresh_profile_on_login: bool) -> Self {
        Self {
            db,
            refresh_profile_on_login,
        }
    }

    /// Resolve the local user id for `identity`
    ///
    /// # Errors
    /// `Database` on store failures. A concurrent first login of the same
    /// identity is not an error: the loser re-reads and returns the
    /// winner's user id.
    pub async fn reconcile(&self, identity: &NormalizedIdentity) -> Result<String, AppError> {
        let (user_id, resolution) = self.resolve(identity).await?;

        RECONCILIATIONS_TOTAL
            .with_label_values(&[identity.provider().as_str(), resolution.as_str()])
            .inc();
        if resolution == Resolution::Created {
            USERS_TOTAL.inc();
        }

        Ok(user_id)
    }

    /// Like [`reconcile`](Self::reconcile), also reporting how the user was found.
    pub async fn resolve(
        &self,
        identity: &NormalizedIdentity,
    ) -> Result<(String, Resolution), AppError> {
        let provider = identity.provider();

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(link) = self
                .db
                .find_provider_identity(provider, identity.provider_user_id())
                .await?
            {
                tracing::debug!(
                    %provider,
                    provider_user_id = identity.provider_user_id(),
                    user_id = %link.user_id,
                    "Provider identity already linked"
                );

                if self.refresh_profile_on_login {
                    self.refresh(&link.user_id, identity).await?;
                }

                return Ok((link.user_id, Resolution::Existing));
            }

            match self.db.link_identity(identity, chrono::Utc::now()).await {
                Ok(outcome) => {
                    let resolution = if outcome.created_user {
                        Resolution::Created
                    } else {
                        Resolution::LinkedByEmail
                    };

                    tracing::info!(
                        %provider,
                        provider_user_id = identity.provider_user_id(),
                        user_id = %outcome.user_id,
                        email = identity.email(),
                        resolution = resolution.as_str(),
                        "Provider identity linked"
                    );

                    return Ok((outcome.user_id, resolution));
                }
                Err(AppError::UniqueConstraintRace) => {
                    RECONCILE_RACES_TOTAL.inc();
                    tracing::debug!(
                        %provider,
                        provider_user_id = identity.provider_user_id(),
                        attempt,
                        "Identity linked concurrently; re-reading"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "identity {}:{} did not converge after {} attempts",
            provider,
            identity.provider_user_id(),
            MAX_ATTEMPTS
        )))
    }

    async fn refresh(&self, user_id: &str, identity: &NormalizedIdentity) -> Result<(), AppError> {
        let changed = self
            .db
            .refresh_user_attributes(
                user_id,
                identity.display_name(),
                identity.avatar_url(),
                chrono::Utc::now(),
            )
            .await?;

        if changed {
            tracing::info!(user_id, "Refreshed profile attributes from provider");
        }

        Ok(())
    }
}
