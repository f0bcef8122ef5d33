//! HTTP/JSON transport to the sandbox orchestrator.
//!
//! Every call is scoped under `/sandboxes` on the configured base URL,
//! carries a bearer token when an API key is configured, and yields the
//! decoded JSON body of a 2xx response. Non-2xx answers become
//! [`ClientError::Status`]; failures to reach the server become
//! [`ClientError::Connectivity`]. The transport never looks inside a
//! payload to decide whether a sandboxed program succeeded.

use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::SandboxOptions;
use crate::error::{ClientError, Result};

const USER_AGENT: &str = concat!("msb-client/", env!("CARGO_PKG_VERSION"));

/// Root collection of the orchestrator's REST surface.
pub const SANDBOXES: &str = "sandboxes";

/// Grace period added on top of a server-side execution bound.
pub const SERVER_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Authenticated JSON client bound to one orchestrator.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport {
    /// Create a transport for the given connection options.
    pub fn new(options: &SandboxOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Transport {
            http,
            base_url: options.server_url.clone(),
            api_key: options.api_key.clone(),
            timeout: options.request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for `/sandboxes/<segments..>`; each segment is
    /// percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidConfig(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .push(SANDBOXES)
            .extend(segments);
        Ok(url)
    }

    pub async fn get(&self, segments: &[&str]) -> Result<Value> {
        self.send(Method::GET, segments, None, None).await
    }

    /// POST a JSON body. `server_timeout` is the bound the server applies to
    /// the work; the local timeout is stretched so it never fires first.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
        server_timeout: Option<Duration>,
    ) -> Result<Value> {
        let body = serde_json::to_vec(body)?;
        self.send(Method::POST, segments, Some(body), server_timeout)
            .await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<Value> {
        self.send(Method::DELETE, segments, None, None).await
    }

    fn effective_timeout(&self, server_timeout: Option<Duration>) -> Duration {
        match server_timeout {
            Some(bound) => self.timeout.max(bound + SERVER_TIMEOUT_GRACE),
            None => self.timeout,
        }
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
        server_timeout: Option<Duration>,
    ) -> Result<Value> {
        let url = self.endpoint(segments)?;
        debug!(%method, %url, "sandbox request");

        let mut request = self
            .http
            .request(method, url)
            .timeout(self.effective_timeout(server_timeout))
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "sandbox request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ClientError::InvalidResponse(format!("body is not JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(url: &str) -> Transport {
        let opts = SandboxOptions::builder()
            .server_url(url)
            .request_timeout(Duration::from_secs(10))
            .ignore_env()
            .build()
            .unwrap();
        Transport::new(&opts).unwrap()
    }

    #[test]
    fn test_endpoint_root() {
        let t = transport("http://127.0.0.1:5555");
        assert_eq!(
            t.endpoint(&[]).unwrap().as_str(),
            "http://127.0.0.1:5555/sandboxes"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_prefix() {
        let t = transport("https://api.example.com/msb/");
        assert_eq!(
            t.endpoint(&["abc", "execute"]).unwrap().as_str(),
            "https://api.example.com/msb/sandboxes/abc/execute"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let t = transport("http://localhost:5555");
        let url = t.endpoint(&["a/b c"]).unwrap();
        assert_eq!(url.path(), "/sandboxes/a%2Fb%20c");
    }

    #[test]
    fn test_server_timeout_extends_local_timeout() {
        let t = transport("http://localhost:5555");
        assert_eq!(t.effective_timeout(None), Duration::from_secs(10));
        assert_eq!(
            t.effective_timeout(Some(Duration::from_secs(120))),
            Duration::from_secs(150)
        );
        // Short server bounds still get the grace period.
        assert_eq!(
            t.effective_timeout(Some(Duration::from_secs(1))),
            Duration::from_secs(31)
        );
    }
}
