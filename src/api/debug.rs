//! Debug endpoints
//!
//! Only mounted when `server.expose_debug_routes` is set.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::dto::UserResponse;
use crate::AppState;
use crate::auth::{CurrentUser, Session};
use crate::error::AppError;

/// Create debug router
///
/// Routes:
/// - GET /debug/users - Every user in the database
/// - GET /debug/session - Caller's decoded session and the user it resolves to
pub fn debug_router() -> Router<AppState> {
    Router::new()
        .route("/debug/users", get(list_users))
        .route("/debug/session", get(inspect_session))
}

/// GET /debug/users
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, AppError> {
    let mut users = Vec::new();
    for user in state.db.list_users().await? {
        let identities = state.db.get_identities_for_user(&user.id).await?;
        users.push(UserResponse::from_user(user, identities));
    }

    Ok(Json(users))
}

#[derive(Debug, Serialize)]
struct SessionDump {
    session: Session,
    /// `None` when the session email no longer matches a user
    user: Option<UserResponse>,
}

/// GET /debug/session
async fn inspect_session(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<SessionDump>, AppError> {
    let user = match state.db.find_user_by_email(&session.email).await? {
        Some(user) => {
            let identities = state.db.get_identities_for_user(&user.id).await?;
            Some(UserResponse::from_user(user, identities))
        }
        None => None,
    };

    Ok(Json(SessionDump { session, user }))
}
