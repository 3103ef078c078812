//! Identity normalization
//!
//! Turns a provider name and the raw claims of a userinfo response into a
//! [`NormalizedIdentity`]. Pure: no I/O, no clock.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Domain GitHub uses for users that keep their email private
pub const GITHUB_NOREPLY_DOMAIN: &str = "users.noreply.github.com";

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    /// Stored and routed form ("google", "github")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Github => "GitHub",
        }
    }

    fn claim_keys(&self) -> ClaimKeys {
        match self {
            Self::Google => ClaimKeys {
                subject: "sub",
                email: "email",
                display_name: "name",
                avatar: "picture",
            },
            Self::Github => ClaimKeys {
                subject: "id",
                email: "email",
                display_name: "name",
                avatar: "avatar_url",
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    /// Case-insensitive: "GOOGLE", "google" and "Google" all resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            _ => Err(AppError::UnsupportedProvider(s.to_string())),
        }
    }
}

struct ClaimKeys {
    subject: &'static str,
    email: &'static str,
    display_name: &'static str,
    avatar: &'static str,
}

/// Canonical identity extracted from provider claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedIdentity {
    provider: Provider,
    provider_user_id: String,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

impl NormalizedIdentity {
    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn provider_user_id(&self) -> &str {
        &self.provider_user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }
}

/// Normalize raw provider claims
///
/// # Errors
/// - `UnsupportedProvider` if `provider_name` is not google/github
/// - `MissingIdentity` if the subject claim is absent
/// - `MissingEmail` if Google claims carry no email
/// - `MissingLogin` if GitHub claims carry neither email nor login
pub fn normalize(
    provider_name: &str,
    claims: &Map<String, Value>,
) -> Result<NormalizedIdentity, AppError> {
    let provider = provider_name.parse::<Provider>()?;
    let keys = provider.claim_keys();

    let provider_user_id = claim_as_id(claims, keys.subject).ok_or_else(|| {
        tracing::warn!(
            %provider,
            claim = keys.subject,
            available = ?claims.keys().collect::<Vec<_>>(),
            "Subject claim missing from userinfo"
        );
        AppError::MissingIdentity
    })?;

    let email = match claim_as_str(claims, keys.email) {
        Some(email) => email.to_string(),
        None => match provider {
            Provider::Github => {
                let login = claim_as_str(claims, "login").ok_or(AppError::MissingLogin)?;
                let synthesized = format!("{login}@{GITHUB_NOREPLY_DOMAIN}");
                tracing::debug!(%provider, email = %synthesized, "Synthesized noreply email");
                synthesized
            }
            Provider::Google => return Err(AppError::MissingEmail),
        },
    };

    Ok(NormalizedIdentity {
        provider,
        provider_user_id,
        email,
        display_name: claim_as_str(claims, keys.display_name).map(str::to_string),
        avatar_url: claim_as_str(claims, keys.avatar).map(str::to_string),
    })
}

/// Non-empty string claim; null, empty and non-string values count as absent.
fn claim_as_str<'a>(claims: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    claims
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Subject identifiers may arrive as strings (OIDC `sub`) or numbers (GitHub `id`).
fn claim_as_id(claims: &Map<String, Value>, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("claims must be an object, got {other}"),
        }
    }

    #[test]
    fn google_claims_map_to_identity() {
        let identity = normalize(
            "GOOGLE",
            &claims(json!({
                "sub": "123",
                "email": "a@x.com",
                "name": "Ann",
                "picture": "https://lh3.example.com/ann.png"
            })),
        )
        .unwrap();

        assert_eq!(identity.provider(), Provider::Google);
        assert_eq!(identity.provider_user_id(), "123");
        assert_eq!(identity.email(), "a@x.com");
        assert_eq!(identity.display_name(), Some("Ann"));
        assert_eq!(identity.avatar_url(), Some("https://lh3.example.com/ann.png"));
    }

    #[test]
    fn github_numeric_id_is_stringified() {
        let identity = normalize(
            "github",
            &claims(json!({
                "id": 583231,
                "login": "octocat",
                "email": "octocat@github.com",
                "name": null,
                "avatar_url": "https://avatars.githubusercontent.com/u/583231"
            })),
        )
        .unwrap();

        assert_eq!(identity.provider(), Provider::Github);
        assert_eq!(identity.provider_user_id(), "583231");
        assert_eq!(identity.email(), "octocat@github.com");
        assert_eq!(identity.display_name(), None);
        assert_eq!(
            identity.avatar_url(),
            Some("https://avatars.githubusercontent.com/u/583231")
        );
    }

    #[test]
    fn github_without_email_synthesizes_noreply_address() {
        let identity = normalize("GITHUB", &claims(json!({"id": 1, "login": "octocat"}))).unwrap();
        assert_eq!(identity.email(), "octocat@users.noreply.github.com");

        let identity = normalize(
            "github",
            &claims(json!({"id": 1, "login": "octocat", "email": ""})),
        )
        .unwrap();
        assert_eq!(identity.email(), "octocat@users.noreply.github.com");
    }

    #[test]
    fn github_without_email_or_login_fails() {
        let error = normalize("github", &claims(json!({"id": 1}))).unwrap_err();
        assert!(matches!(error, AppError::MissingLogin));
    }

    #[test]
    fn google_without_email_fails() {
        let error = normalize("google", &claims(json!({"sub": "123", "name": "Ann"}))).unwrap_err();
        assert!(matches!(error, AppError::MissingEmail));
    }

    #[test]
    fn missing_subject_fails_before_email_checks() {
        let error = normalize("google", &claims(json!({"email": "a@x.com"}))).unwrap_err();
        assert!(matches!(error, AppError::MissingIdentity));

        let error = normalize("github", &claims(json!({"id": null, "login": "x"}))).unwrap_err();
        assert!(matches!(error, AppError::MissingIdentity));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let error = normalize("facebook", &claims(json!({"sub": "1", "email": "a@x.com"})))
            .unwrap_err();
        assert!(matches!(error, AppError::UnsupportedProvider(name) if name == "facebook"));
        assert!(AppError::UnsupportedProvider("facebook".into()).is_normalization_error());
    }

    #[test]
    fn normalize_is_deterministic() {
        let input = claims(json!({"id": 42, "login": "annx", "name": "Ann X"}));
        assert_eq!(
            normalize("github", &input).unwrap(),
            normalize("github", &input).unwrap()
        );
    }

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!("Google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("GITHUB".parse::<Provider>().unwrap(), Provider::Github);
        assert_eq!(Provider::Github.to_string(), "github");
    }
}
