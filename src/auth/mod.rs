//! OAuth authentication
//!
//! Handles:
//! - OAuth authorization code flow (Google, GitHub)
//! - Session management
//! - Authentication extractors

mod client;
mod middleware;
mod oauth;
pub mod session;

pub use client::ProviderClient;
pub use middleware::{CurrentUser, MaybeUser};
pub use oauth::auth_router;
pub use session::{Session, create_session_token, verify_session_token};
