//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the SDK.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SdkConfig {
    /// Gateway HTTP endpoint settings.
    pub gateway: GatewayConfig,

    /// Block finality polling settings.
    pub finality: FinalityConfig,

    /// Event-log socket settings.
    pub events: EventsConfig,

    /// Log filter used by the composition root.
    pub logging: LoggingConfig,
}

impl SdkConfig {
    /// WebSocket base url: the explicit override, or the gateway url with
    /// its `http` scheme prefix swapped for `ws`.
    pub fn ws_url(&self) -> String {
        match &self.events.ws_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => http_to_ws(&self.gateway.url),
        }
    }
}

pub(crate) fn http_to_ws(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match url.strip_prefix("http") {
        Some(rest) => format!("ws{}", rest),
        None => url.to_string(),
    }
}

/// Gateway connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base url of the gateway (e.g., "http://localhost:8080").
    pub url: String,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Finality registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FinalityConfig {
    /// Delay between polls while the head block is not yet final.
    pub poll_interval_ms: u64,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Event-log subscription configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EventsConfig {
    /// WebSocket base url; derived from the gateway url when absent.
    pub ws_url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "btp_sdk=info".to_string(),
        }
    }
}
