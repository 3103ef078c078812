//! OAuth login flow
//!
//! Implements the OAuth 2.0 authorization code flow for every configured
//! provider and hands the resulting claims to identity reconciliation.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use serde::Deserialize;

use super::client::ProviderClient;
use super::middleware::MaybeUser;
use super::session::{SESSION_COOKIE, Session, create_session_token};
use crate::AppState;
use crate::config::OAuthProviderConfig;
use crate::error::AppError;
use crate::identity::{Provider, normalize};
use crate::metrics::LOGINS_TOTAL;
use crate::service::AccountReconciler;

/// CSRF state cookie set during the authorize redirect
const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Where a completed login lands
const POST_LOGIN_REDIRECT: &str = "/profile";

/// Create authentication router
///
/// Routes:
/// - GET / and GET /login - Login page
/// - GET /auth/:provider - Redirect to provider
/// - GET /auth/:provider/callback - OAuth callback
/// - POST /logout - Logout
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/", get(login_page))
        .route("/login", get(login_page))
        .route("/auth/:provider", get(provider_redirect))
        .route("/auth/:provider/callback", get(provider_callback))
        .route("/logout", post(logout))
}

// =============================================================================
// Login Page
// =============================================================================

/// GET /login
///
/// Renders a simple login page with one sign-in link per configured provider.
async fn login_page(State(state): State<AppState>, MaybeUser(session): MaybeUser) -> Html<String> {
    let body = match session {
        Some(session) => format!(
            r#"<p>Signed in as {}</p>
            <a href="/profile">View profile</a>
            <form method="post" action="/logout"><button type="submit">Sign out</button></form>"#,
            html_escape::encode_text(&session.email)
        ),
        None => state
            .config
            .providers
            .enabled()
            .into_iter()
            .map(|provider| {
                format!(
                    r#"<p><a href="/auth/{}">Sign in with {}</a></p>"#,
                    provider.as_str(),
                    provider.label()
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Login - oauth-profile</title></head>
<body>
    <h1>oauth-profile</h1>
    {body}
</body>
</html>"#
    ))
}

// =============================================================================
// OAuth
// =============================================================================

fn provider_config(
    state: &AppState,
    provider_name: &str,
) -> Result<(Provider, OAuthProviderConfig), AppError> {
    let provider = provider_name.parse::<Provider>()?;
    let config = state
        .config
        .providers
        .get(provider)
        .cloned()
        .ok_or_else(|| AppError::UnsupportedProvider(provider_name.to_string()))?;

    Ok((provider, config))
}

/// GET /auth/:provider
///
/// # Steps
/// 1. Generate CSRF state token
/// 2. Store state in cookie
/// 3. Redirect to the provider with client_id, redirect_uri, scope, state
async fn provider_redirect(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (provider, client_config) = provider_config(&state, &provider_name)?;
    let client = ProviderClient::new(
        &state.http_client,
        provider,
        &client_config,
        state.config.redirect_uri(provider),
    );

    let csrf_state = generate_csrf_state();
    let location = client.authorization_url(&csrf_state)?;

    tracing::debug!(%provider, "Redirecting to provider authorization");

    let jar = jar.add(private_cookie(
        OAUTH_STATE_COOKIE,
        csrf_state,
        state.config.should_use_secure_cookies(),
    ));

    Ok((jar, Redirect::to(&location)))
}

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
    /// CSRF state token
    state: Option<String>,
    /// Set when the user denied access
    error: Option<String>,
}

/// GET /auth/:provider/callback
///
/// # Steps
/// 1. Verify CSRF state
/// 2. Exchange code for access token
/// 3. Fetch userinfo claims
/// 4. Normalize claims and reconcile to a local user
/// 5. Create session and set cookie
/// 6. Redirect to profile
async fn provider_callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (provider, client_config) = provider_config(&state, &provider_name)?;

    let session = match complete_login(&state, provider, &client_config, query, &jar).await {
        Ok(session) => session,
        Err(error) => {
            let outcome = if error.is_normalization_error() {
                "invalid_claims"
            } else {
                "failure"
            };
            LOGINS_TOTAL
                .with_label_values(&[provider.as_str(), outcome])
                .inc();
            tracing::warn!(%provider, %error, "Login failed");
            return Err(error);
        }
    };

    let token = create_session_token(&session, &state.config.auth.session_secret)?;

    LOGINS_TOTAL
        .with_label_values(&[provider.as_str(), "success"])
        .inc();
    tracing::info!(%provider, user_id = %session.user_id, "Login completed");

    let jar = jar
        .remove(Cookie::build(OAUTH_STATE_COOKIE).path("/"))
        .add(private_cookie(
            SESSION_COOKIE,
            token,
            state.config.should_use_secure_cookies(),
        ));

    Ok((jar, Redirect::to(POST_LOGIN_REDIRECT)))
}

async fn complete_login(
    state: &AppState,
    provider: Provider,
    client_config: &OAuthProviderConfig,
    query: CallbackQuery,
    jar: &CookieJar,
) -> Result<Session, AppError> {
    if let Some(error) = query.error {
        tracing::info!(%provider, %error, "Provider denied authorization");
        return Err(AppError::Unauthorized);
    }

    verify_csrf_state(query.state.as_deref(), jar)?;

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("missing authorization code".to_string()))?;

    let client = ProviderClient::new(
        &state.http_client,
        provider,
        client_config,
        state.config.redirect_uri(provider),
    );
    let access_token = client.exchange_code(&code).await?;
    let claims = client.fetch_claims(&access_token).await?;

    let identity = normalize(provider.as_str(), &claims)?;
    let user_id = AccountReconciler::new(
        state.db.clone(),
        state.config.auth.refresh_profile_on_login,
    )
    .reconcile(&identity)
    .await?;

    // Stored email, not this login's claim: profile lookups key on it.
    let user = state
        .db
        .get_user(&user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(Session::new(
        user.id,
        user.email,
        provider,
        state.config.auth.session_max_age,
    ))
}

// =============================================================================
// Logout
// =============================================================================

/// POST /logout
///
/// Clears session cookies and redirects to the login page.
async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(OAUTH_STATE_COOKIE).path("/"));

    (jar, Redirect::to("/"))
}

// =============================================================================
// Helpers
// =============================================================================

fn private_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Generate a random CSRF state token
fn generate_csrf_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Verify CSRF state from cookie matches callback state
fn verify_csrf_state(state: Option<&str>, jar: &CookieJar) -> Result<(), AppError> {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .ok_or(AppError::Unauthorized)?;

    match state {
        Some(state) if !expected.is_empty() && state == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
