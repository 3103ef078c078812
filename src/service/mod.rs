//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate identity reconciliation and profile edits.

mod profile;
mod reconcile;

pub use profile::ProfileService;
pub use reconcile::{AccountReconciler, Resolution};
