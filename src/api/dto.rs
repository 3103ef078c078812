//! API request/response DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{ProfilePatch, ProviderIdentity, User};

/// User response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Linked provider names, e.g. ["google", "github"]
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub providers: Vec<String>,
}

impl UserResponse {
    pub fn from_user(user: User, identities: Vec<ProviderIdentity>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: user.bio,
            created_at: user.created_at,
            updated_at: user.updated_at,
            providers: identities
                .into_iter()
                .map(|identity| identity.provider)
                .collect(),
        }
    }
}

/// POST /profile body
///
/// A missing field is written as null.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl From<ProfileUpdateRequest> for ProfilePatch {
    fn from(request: ProfileUpdateRequest) -> Self {
        Self {
            display_name: request.display_name,
            bio: request.bio,
        }
    }
}
