//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Login Metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauth_profile_logins_total", "Total number of OAuth login callbacks"),
        &["provider", "outcome"]
    ).expect("metric can be created");

    // Reconciliation Metrics
    pub static ref RECONCILIATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauth_profile_reconciliations_total", "Total number of identity reconciliations"),
        &["provider", "result"]
    ).expect("metric can be created");
    pub static ref RECONCILE_RACES_TOTAL: IntCounter = IntCounter::new(
        "oauth_profile_reconcile_races_total",
        "Concurrent first logins resolved by re-reading the winning identity"
    ).expect("metric can be created");

    // Profile Metrics
    pub static ref PROFILE_UPDATES_TOTAL: IntCounter = IntCounter::new(
        "oauth_profile_profile_updates_total",
        "Total number of profile updates"
    ).expect("metric can be created");
    pub static ref USERS_TOTAL: IntGauge = IntGauge::new(
        "oauth_profile_users_total",
        "Total number of registered users"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("oauth_profile_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry. Repeated calls are no-ops.
pub fn init_metrics() {
    INIT.call_once(register_all);
}

fn register_all() {
    REGISTRY
        .register(Box::new(LOGINS_TOTAL.clone()))
        .expect("LOGINS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(RECONCILIATIONS_TOTAL.clone()))
        .expect("RECONCILIATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(RECONCILE_RACES_TOTAL.clone()))
        .expect("RECONCILE_RACES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROFILE_UPDATES_TOTAL.clone()))
        .expect("PROFILE_UPDATES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(USERS_TOTAL.clone()))
        .expect("USERS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
