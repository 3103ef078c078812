//! Profile endpoints
//!
//! Both routes require an authenticated session.

use axum::{Json, Router, extract::State, routing::get};

use super::dto::{ProfileUpdateRequest, UserResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::ProfileService;

/// Create profile router
///
/// Routes:
/// - GET /profile - Caller's user record
/// - POST /profile - Update display name and bio
pub fn profile_router() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).post(update_profile))
}

/// GET /profile
async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<UserResponse>, AppError> {
    let service = ProfileService::new(state.db.clone());
    let user = service.get_profile(&session.email).await?;
    let identities = service.linked_identities(&user.id).await?;

    Ok(Json(UserResponse::from_user(user, identities)))
}

/// POST /profile
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(request): Json<ProfileUpdateRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let service = ProfileService::new(state.db.clone());
    let user = service.update_profile(&session.email, request.into()).await?;
    let identities = service.linked_identities(&user.id).await?;

    Ok(Json(UserResponse::from_user(user, identities)))
}
