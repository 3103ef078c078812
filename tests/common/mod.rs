//! Common test utilities for E2E tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use oauth_profile::{AppState, config};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Authorization code the mock provider refuses
pub const REJECTED_CODE: &str = "rejected-code";

type ClaimsByProvider = Arc<Mutex<HashMap<String, Value>>>;

/// In-process OAuth provider serving `/{provider}/token` and `/{provider}/userinfo`
pub struct MockProvider {
    pub addr: String,
    claims: ClaimsByProvider,
}

impl MockProvider {
    pub async fn start() -> Self {
        let claims: ClaimsByProvider = Arc::new(Mutex::new(HashMap::new()));

        let app = Router::new()
            .route("/:provider/token", post(token))
            .route("/:provider/userinfo", get(userinfo))
            .with_state(claims.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, claims }
    }

    /// Claims returned by the next userinfo call for `provider`
    pub fn set_claims(&self, provider: &str, claims: Value) {
        self.claims
            .lock()
            .unwrap()
            .insert(provider.to_string(), claims);
    }

    fn client_config(&self, provider: &str) -> config::OAuthProviderConfig {
        config::OAuthProviderConfig {
            client_id: format!("{provider}-client-id"),
            client_secret: format!("{provider}-client-secret"),
            authorize_url: Some(format!("https://{provider}.provider.test/authorize")),
            token_url: Some(format!("{}/{provider}/token", self.addr)),
            userinfo_url: Some(format!("{}/{provider}/userinfo", self.addr)),
            scopes: None,
        }
    }
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    match form.get("code").map(String::as_str) {
        Some(REJECTED_CODE) | None => Json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })),
        Some(code) => Json(json!({
            "access_token": format!("mock-access-{code}"),
            "token_type": "bearer"
        })),
    }
}

async fn userinfo(State(claims): State<ClaimsByProvider>, Path(provider): Path<String>) -> Response {
    match claims.lock().unwrap().get(&provider).cloned() {
        Some(claims) => Json(claims).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub provider: MockProvider,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let provider = MockProvider::start().await;

        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
                expose_debug_routes: false,
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-that-is-32-bytes!".to_string(),
                session_max_age: 604800,
                refresh_profile_on_login: false,
            },
            providers: config::ProvidersConfig {
                google: Some(provider.client_config("google")),
                github: Some(provider.client_config("github")),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        let state = AppState::new(config).await.unwrap();

        // Redirects are inspected by the tests, never followed.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let app = oauth_profile::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            provider,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Start a login and return `(state, oauth_state cookie value)`
    pub async fn begin_login(&self, provider: &str) -> (String, String) {
        let response = self
            .client
            .get(self.url(&format!("/auth/{provider}")))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_redirection());

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .expect("location header");
        let state = url::Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .expect("state parameter");
        let cookie = set_cookie_value(&response, "oauth_state").expect("oauth_state cookie");

        (state, cookie)
    }

    /// Call the provider callback with a valid CSRF state
    pub async fn callback(&self, provider: &str, code: &str) -> reqwest::Response {
        let (state, cookie) = self.begin_login(provider).await;

        self.client
            .get(self.url(&format!(
                "/auth/{provider}/callback?code={code}&state={state}"
            )))
            .header("Cookie", format!("oauth_state={cookie}"))
            .send()
            .await
            .unwrap()
    }

    /// Log in through the full OAuth flow and return the session token
    pub async fn login(&self, provider: &str, claims: Value) -> String {
        self.provider.set_claims(provider, claims);

        let response = self.callback(provider, "good-code").await;
        assert!(
            response.status().is_redirection(),
            "login failed with {}",
            response.status()
        );

        set_cookie_value(&response, "session").expect("session cookie")
    }

    /// GET /profile as the holder of `token`
    pub async fn get_profile(&self, token: &str) -> reqwest::Response {
        self.client
            .get(self.url("/profile"))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .unwrap()
    }
}

/// Value of the `name` cookie set by `response`, if any
pub fn set_cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find_map(|pair| pair.strip_prefix(&prefix).map(ToOwned::to_owned))
        .filter(|value| !value.is_empty())
}
