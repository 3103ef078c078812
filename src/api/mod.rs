//! API layer
//!
//! HTTP handlers for:
//! - Profile view/edit
//! - Debug user listing
//! - Metrics (Prometheus)

mod debug;
mod dto;
pub mod metrics;
mod profile;

pub use dto::*;

pub use debug::debug_router;
pub use metrics::metrics_router;
pub use profile::profile_router;
