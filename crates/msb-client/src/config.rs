//! Connection and resource configuration.
//!
//! [`SandboxOptions`] carries everything needed to address the orchestrator
//! and is fixed for the lifetime of a session. [`StartOptions`] carries the
//! resources requested when the sandbox is started. Both are plain values
//! assembled by builders; building never touches the network.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::language::Language;

/// Orchestrator address used when neither the builder nor `MSB_SERVER_URL` set one.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5555";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default memory request in MiB.
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// Default CPU request.
pub const DEFAULT_CPU_COUNT: u32 = 1;

/// Default local HTTP timeout per request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on sandbox creation.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(180);

/// Environment variable consulted for the server URL.
pub const SERVER_URL_ENV: &str = "MSB_SERVER_URL";

/// Environment variable consulted for the API key.
pub const API_KEY_ENV: &str = "MSB_API_KEY";

/// Connection parameters for one sandbox session.
#[derive(Clone)]
pub struct SandboxOptions {
    pub(crate) server_url: Url,
    pub(crate) namespace: String,
    pub(crate) name: String,
    pub(crate) api_key: Option<String>,
    pub(crate) language: Option<Language>,
    pub(crate) request_timeout: Duration,
}

impl SandboxOptions {
    /// Create a new builder for SandboxOptions
    pub fn builder() -> SandboxOptionsBuilder {
        SandboxOptionsBuilder::default()
    }

    /// Options resolved purely from defaults and the environment.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl fmt::Debug for SandboxOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxOptions")
            .field("server_url", &self.server_url.as_str())
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Builder for [`SandboxOptions`].
#[derive(Debug, Clone)]
pub struct SandboxOptionsBuilder {
    server_url: Option<String>,
    namespace: Option<String>,
    name: Option<String>,
    api_key: Option<String>,
    language: Option<Language>,
    request_timeout: Duration,
    use_env: bool,
}

impl Default for SandboxOptionsBuilder {
    fn default() -> Self {
        Self {
            server_url: None,
            namespace: None,
            name: None,
            api_key: None,
            language: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            use_env: true,
        }
    }
}

impl SandboxOptionsBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the sandbox name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the API key. An empty key means unauthenticated requests.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Pick a language profile; it supplies the default image and helpers.
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Local HTTP timeout applied to every request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Do not consult `MSB_SERVER_URL` / `MSB_API_KEY`.
    pub fn ignore_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Validate and build the options.
    pub fn build(self) -> Result<SandboxOptions> {
        let use_env = self.use_env;
        let env = |key: &str| {
            if use_env {
                std::env::var(key).ok()
            } else {
                None
            }
        };

        let raw_url = self
            .server_url
            .clone()
            .or_else(|| env(SERVER_URL_ENV))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = parse_server_url(&raw_url)?;

        let namespace = self
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if namespace.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }

        let name = self.name.unwrap_or_else(generate_name);
        if name.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "sandbox name must not be empty".to_string(),
            ));
        }

        let api_key = self
            .api_key
            .or_else(|| env(API_KEY_ENV))
            .filter(|key| !key.is_empty());

        if self.request_timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "request timeout must be non-zero".to_string(),
            ));
        }

        Ok(SandboxOptions {
            server_url,
            namespace,
            name,
            api_key,
            language: self.language,
            request_timeout: self.request_timeout,
        })
    }
}

fn parse_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ClientError::InvalidConfig(format!("server URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ClientError::InvalidConfig(format!(
                "server URL {raw:?}: unsupported scheme {other:?}"
            )))
        }
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ClientError::InvalidConfig(format!(
            "server URL {raw:?} has no host"
        )));
    }
    Ok(url)
}

fn generate_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("sandbox-{}", &id[..8])
}

/// Resources requested when a sandbox starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// OCI image; `None` uses the language default (or the server's).
    pub image: Option<String>,
    /// Memory limit in MiB.
    pub memory_mb: u32,
    /// Number of virtual CPUs.
    pub cpu_count: u32,
    /// Environment entries in `KEY=VALUE` form.
    pub envs: Vec<String>,
    /// Volume mappings, `host:guest`.
    pub volumes: Vec<String>,
    /// Port mappings, `host:guest`.
    pub ports: Vec<String>,
    /// Working directory inside the sandbox.
    pub workdir: Option<String>,
    /// Sandboxes that must be running before this one starts.
    pub depends_on: Vec<String>,
    /// Shell used for scripts and `exec`.
    pub shell: Option<String>,
    /// Named scripts the sandbox can run.
    pub scripts: BTreeMap<String, String>,
    /// Command the sandbox runs on start.
    pub exec: Option<String>,
    /// How long the server may take to bring the sandbox up; image pulls
    /// can be slow.
    pub timeout: Duration,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            image: None,
            memory_mb: DEFAULT_MEMORY_MB,
            cpu_count: DEFAULT_CPU_COUNT,
            envs: Vec::new(),
            volumes: Vec::new(),
            ports: Vec::new(),
            workdir: None,
            depends_on: Vec::new(),
            shell: None,
            scripts: BTreeMap::new(),
            exec: None,
            timeout: DEFAULT_START_TIMEOUT,
        }
    }
}

impl StartOptions {
    pub fn builder() -> StartOptionsBuilder {
        StartOptionsBuilder::default()
    }

    /// Check resource requests; called again by `start`.
    pub fn validate(&self) -> Result<()> {
        if self.memory_mb == 0 {
            return Err(ClientError::InvalidConfig(
                "memory_mb must be non-zero".to_string(),
            ));
        }
        if self.cpu_count == 0 {
            return Err(ClientError::InvalidConfig(
                "cpu_count must be non-zero".to_string(),
            ));
        }
        if let Some(image) = &self.image {
            if image.trim().is_empty() {
                return Err(ClientError::InvalidConfig(
                    "image must not be empty when set".to_string(),
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig(
                "start timeout must be non-zero".to_string(),
            ));
        }
        if let Some(bad) = self.envs.iter().find(|e| !e.contains('=')) {
            return Err(ClientError::InvalidConfig(format!(
                "environment entry {bad:?} is not KEY=VALUE"
            )));
        }
        Ok(())
    }
}

/// Builder for [`StartOptions`].
#[derive(Debug, Clone, Default)]
pub struct StartOptionsBuilder {
    options: StartOptions,
}

impl StartOptionsBuilder {
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.options.image = Some(image.into());
        self
    }

    pub fn memory_mb(mut self, memory_mb: u32) -> Self {
        self.options.memory_mb = memory_mb;
        self
    }

    pub fn cpu_count(mut self, cpu_count: u32) -> Self {
        self.options.cpu_count = cpu_count;
        self
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.options
            .envs
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn volume(mut self, mapping: impl Into<String>) -> Self {
        self.options.volumes.push(mapping.into());
        self
    }

    pub fn port(mut self, mapping: impl Into<String>) -> Self {
        self.options.ports.push(mapping.into());
        self
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.options.workdir = Some(workdir.into());
        self
    }

    pub fn depends_on(mut self, sandbox: impl Into<String>) -> Self {
        self.options.depends_on.push(sandbox.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.options.shell = Some(shell.into());
        self
    }

    pub fn script(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.options.scripts.insert(name.into(), body.into());
        self
    }

    pub fn exec(mut self, command: impl Into<String>) -> Self {
        self.options.exec = Some(command.into());
        self
    }

    /// Bound on sandbox creation, applied instead of the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<StartOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
