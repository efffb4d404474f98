//! Server configuration from environment variables.

use std::env;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub gateway_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_enabled: true,
            gateway_timeout: asms_core::DEFAULT_TIMEOUT,
        }
    }
}

impl ApiConfig {
    /// Reads `HOST`, `PORT`, `CORS_ENABLED`, and `GATEWAY_TIMEOUT_SECS`.
    /// Invalid values fall back to defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .ok()
            .and_then(|p| match p.parse() {
                Ok(port) => Some(port),
                Err(e) => {
                    warn!(value = %p, error = %e, "invalid PORT, using default");
                    None
                }
            })
            .unwrap_or(defaults.port);
        let cors_enabled = env::var("CORS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.cors_enabled);
        let gateway_timeout = env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|t| match t.parse() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    warn!(value = %t, error = %e, "invalid GATEWAY_TIMEOUT_SECS, using default");
                    None
                }
            })
            .unwrap_or(defaults.gateway_timeout);

        Self {
            host,
            port,
            cors_enabled,
            gateway_timeout,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
