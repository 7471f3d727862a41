use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// A reply from the control service, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    /// Canonical reason phrase for `status`, when one exists.
    pub reason: Option<String>,
    /// Parsed JSON body; `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl HttpReply {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string);
        Self {
            status,
            reason,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport to the remote control service. `Err` means no HTTP reply was
/// obtained at all (connection refused, timeout, ...).
pub trait ControlTransport: Send + Sync {
    fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply>;
    fn get_json(&self, path: &str) -> Result<HttpReply>;
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// `timeout` bounds action calls, which may legitimately block until the
    /// server-side operation finishes.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("vram-widget")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn read_reply(resp: Response) -> Result<HttpReply> {
    let status = resp.status().as_u16();
    let text = resp.text().context("read response body")?;
    let body = if text.trim().is_empty() {
        None
    } else {
        serde_json::from_str(&text).ok()
    };
    Ok(HttpReply::new(status, body))
}

impl ControlTransport for HttpTransport {
    fn post_json(&self, path: &str, body: &Value) -> Result<HttpReply> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .with_context(|| format!("POST {url}"))?;
        read_reply(resp)
    }

    fn get_json(&self, path: &str) -> Result<HttpReply> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .timeout(STATUS_TIMEOUT)
            .send()
            .with_context(|| format!("GET {url}"))?;
        read_reply(resp)
    }
}
