//! Liveness endpoint and process start-time tracking.

use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use serde_json::json;

/// Seconds since the UNIX epoch at first use; initialized during startup.
static STARTUP_TIME: Lazy<u64> = Lazy::new(|| {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
});

pub fn init_startup_time() {
    let _ = *STARTUP_TIME;
}

pub fn uptime_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .saturating_sub(*STARTUP_TIME)
}

/// `GET /health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "uptime_seconds": uptime_seconds(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
