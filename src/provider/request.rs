//! HTTP transport to the gateway.
//!
//! Every response body is JSON. Non-2xx responses carry
//! `{code, message, data}` and surface as [`BtpError::ServerReject`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{BtpError, BtpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
        }
    }
}

/// Transport the provider issues gateway requests through.
#[async_trait]
pub trait HttpProvider: Send + Sync {
    /// Base URL without a trailing slash.
    fn base_url(&self) -> &str;

    /// Send a request to `base_url + path` and return the decoded JSON body.
    async fn request(&self, path: &str, options: RequestOptions) -> BtpResult<Value>;
}

/// reqwest-backed [`HttpProvider`].
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        let base_url = base_url.trim_end_matches('/').to_string();
        debug!(base_url = %base_url, timeout_ms, "Created gateway client");
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[async_trait]
impl HttpProvider for GatewayClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, path: &str, options: RequestOptions) -> BtpResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, method = ?options.method, "Gateway request");

        let builder = match options.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let builder = match &options.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let resp = builder.timeout(self.timeout).send().await.map_err(|e| {
            error!(base_url = %self.base_url, path = %path, error = %e, "Failed to fetch");
            BtpError::Transport(e.to_string())
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            error!(
                base_url = %self.base_url,
                path = %path,
                error = %e,
                "Failed to read response body"
            );
            BtpError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            let err = reject_from_body(status.as_u16(), &body);
            error!(
                base_url = %self.base_url,
                path = %path,
                error = %err,
                "Gateway rejected request"
            );
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|_| BtpError::InvalidFormat("gateway response".into()))
    }
}

/// Build a [`BtpError::ServerReject`] from a non-2xx body.
///
/// A body that is not a JSON object keeps the HTTP status as its code and
/// the raw text as its message.
pub(crate) fn reject_from_body(status: u16, body: &str) -> BtpError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed
        .get("code")
        .and_then(Value::as_i64)
        .unwrap_or(i64::from(status));
    let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let data = parsed.get("data").cloned().unwrap_or(Value::Null);
    BtpError::ServerReject {
        status,
        code,
        message,
        data,
    }
}
