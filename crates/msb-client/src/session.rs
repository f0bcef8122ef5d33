//! Sandbox session: lifecycle and operations for one remote sandbox.
//!
//! A [`Sandbox`] moves through `Uninitialized -> Started -> Stopped`.
//! `Stopped` is terminal; starting again needs a new session. The remote
//! sandbox is only released by [`Sandbox::stop`], never by dropping the
//! handle, so callers either stop explicitly or use [`Sandbox::run_scoped`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{SandboxOptions, StartOptions};
use crate::error::{ClientError, Result};
use crate::execution::{CommandExecution, Execution};
use crate::fields::Aliases;
use crate::language::Language;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::transport::Transport;

const SANDBOX_ID: Aliases = Aliases(&["sandboxId", "sandbox_id", "id"]);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Started,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Started => "started",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

enum Lifecycle {
    Uninitialized,
    Started { sandbox_id: String },
    Stopped,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSandbox<'a> {
    name: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lang: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    memory_mb: u32,
    cpu_count: u32,
    #[serde(skip_serializing_if = "is_empty")]
    envs: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    volumes: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    ports: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    workdir: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty")]
    depends_on: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    shell: Option<&'a str>,
    #[serde(skip_serializing_if = "no_scripts")]
    scripts: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exec: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunCode<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunCommand<'a> {
    command: &'a str,
    args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
}

fn is_empty(values: &&[String]) -> bool {
    values.is_empty()
}

fn no_scripts(scripts: &&BTreeMap<String, String>) -> bool {
    scripts.is_empty()
}

/// Whole seconds, rounded up so a sub-second bound is not sent as zero.
fn timeout_seconds(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

/// Handle owning the lifecycle of one remote sandbox.
///
/// # Concurrency
///
/// The session holds no lock. `start` and `stop` take `&mut self`, while
/// code, command and metrics calls take `&self`, so the borrow checker
/// already rules out a lifecycle transition racing other calls. Several
/// `&self` calls may be in flight at once; they are independent round trips
/// with no ordering guarantee between them. To share one session across
/// tasks that may also stop it, wrap it in the caller's own
/// `Arc<tokio::sync::Mutex<Sandbox>>`.
///
/// # Cleanup
///
/// Dropping a started session does not release the remote sandbox; it only
/// logs a warning. Call [`Sandbox::stop`] on every path, or let
/// [`Sandbox::run_scoped`] do it.
pub struct Sandbox {
    options: SandboxOptions,
    transport: Transport,
    lifecycle: Lifecycle,
    resources: Option<StartOptions>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("name", &self.options.name)
            .field("namespace", &self.options.namespace)
            .field("state", &self.state())
            .field("sandbox_id", &self.sandbox_id())
            .finish()
    }
}

impl Sandbox {
    /// Create an unstarted session. No network I/O happens here.
    pub fn new(options: SandboxOptions) -> Result<Self> {
        let transport = Transport::new(&options)?;
        Ok(Sandbox {
            options,
            transport,
            lifecycle: Lifecycle::Uninitialized,
            resources: None,
        })
    }

    /// Session configured from defaults and `MSB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(SandboxOptions::from_env()?)
    }

    /// Python session configured from the environment.
    pub fn python() -> Result<Self> {
        Self::new(
            SandboxOptions::builder()
                .language(Language::Python)
                .build()?,
        )
    }

    /// Node.js session configured from the environment.
    pub fn node() -> Result<Self> {
        Self::new(SandboxOptions::builder().language(Language::Node).build()?)
    }

    pub fn state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Uninitialized => SessionState::Uninitialized,
            Lifecycle::Started { .. } => SessionState::Started,
            Lifecycle::Stopped => SessionState::Stopped,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state() == SessionState::Started
    }

    /// Identifier assigned by the orchestrator; `None` unless started.
    pub fn sandbox_id(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::Started { sandbox_id } => Some(sandbox_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    pub fn server_url(&self) -> &str {
        self.options.server_url.as_str()
    }

    pub fn language(&self) -> Option<Language> {
        self.options.language
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Resources the sandbox was started with, image default applied.
    pub fn resources(&self) -> Option<&StartOptions> {
        self.resources.as_ref()
    }

    fn require_started(&self, operation: &'static str) -> Result<&str> {
        self.sandbox_id().ok_or(ClientError::InvalidState {
            operation,
            state: self.state(),
        })
    }

    /// Allocate the remote sandbox.
    ///
    /// Valid only from `Uninitialized`. On failure the session stays
    /// `Uninitialized` and may be started again. The local call waits at
    /// least the start timeout plus the transport's grace period.
    pub async fn start(&mut self, options: StartOptions) -> Result<()> {
        let state = self.state();
        if state != SessionState::Uninitialized {
            return Err(ClientError::InvalidState {
                operation: "start",
                state,
            });
        }
        options.validate()?;

        let image = options.image.clone().or_else(|| {
            self.options
                .language
                .map(|lang| lang.default_image().to_string())
        });

        let request = CreateSandbox {
            name: &self.options.name,
            namespace: &self.options.namespace,
            lang: self.options.language.map(|lang| lang.as_str()),
            image: image.as_deref(),
            memory_mb: options.memory_mb,
            cpu_count: options.cpu_count,
            envs: &options.envs,
            volumes: &options.volumes,
            ports: &options.ports,
            workdir: options.workdir.as_deref(),
            depends_on: &options.depends_on,
            shell: options.shell.as_deref(),
            scripts: &options.scripts,
            exec: options.exec.as_deref(),
        };

        let response = self
            .transport
            .post(&[], &request, Some(options.timeout))
            .await?;
        let sandbox_id = SANDBOX_ID
            .non_empty_text(&response)
            .map(str::to_string)
            .or_else(|| SANDBOX_ID.integer(&response).map(|id| id.to_string()))
            .ok_or_else(|| {
                ClientError::InvalidResponse("start response carries no sandbox id".to_string())
            })?;

        info!(
            name = %self.options.name,
            namespace = %self.options.namespace,
            sandbox_id = %sandbox_id,
            "started sandbox"
        );
        self.lifecycle = Lifecycle::Started { sandbox_id };
        self.resources = Some(StartOptions { image, ..options });
        Ok(())
    }

    /// Release the remote sandbox.
    ///
    /// A no-op unless the session is started. Otherwise the session becomes
    /// `Stopped` whatever the server answers; a failed delete is logged and
    /// then returned so the caller can report it.
    pub async fn stop(&mut self) -> Result<()> {
        let sandbox_id = match &self.lifecycle {
            Lifecycle::Started { sandbox_id } => sandbox_id.clone(),
            _ => return Ok(()),
        };

        let outcome = self.transport.delete(&[sandbox_id.as_str()]).await;
        self.lifecycle = Lifecycle::Stopped;

        match outcome {
            Ok(_) => {
                info!(name = %self.options.name, sandbox_id = %sandbox_id, "stopped sandbox");
                Ok(())
            }
            Err(err) => {
                warn!(
                    name = %self.options.name,
                    sandbox_id = %sandbox_id,
                    error = %err,
                    "failed to stop sandbox remotely; handle marked stopped"
                );
                Err(err)
            }
        }
    }

    /// Run source code in the sandbox.
    pub async fn run_code(&self, code: &str) -> Result<Execution> {
        self.execute_code(code, None).await
    }

    /// Run source code with a server-side execution bound.
    pub async fn run_code_with_timeout(&self, code: &str, timeout: Duration) -> Result<Execution> {
        self.execute_code(code, Some(timeout)).await
    }

    async fn execute_code(&self, code: &str, timeout: Option<Duration>) -> Result<Execution> {
        let sandbox_id = self.require_started("run code in")?;
        let request = RunCode {
            code,
            timeout_seconds: timeout.map(timeout_seconds),
        };

        let began = Instant::now();
        let response = self
            .transport
            .post(&[sandbox_id, "execute"], &request, timeout)
            .await?;
        let execution = Execution::from_response(response, Some(began.elapsed()));

        debug!(
            sandbox_id = %sandbox_id,
            success = execution.is_success(),
            "code run finished"
        );
        Ok(execution)
    }

    /// Run a shell command with arguments in the sandbox.
    pub async fn run_command<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
    ) -> Result<CommandExecution> {
        self.execute_command(command, args, None).await
    }

    /// Run a shell command with a server-side execution bound.
    pub async fn run_command_with_timeout<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        timeout: Duration,
    ) -> Result<CommandExecution> {
        self.execute_command(command, args, Some(timeout)).await
    }

    async fn execute_command<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        timeout: Option<Duration>,
    ) -> Result<CommandExecution> {
        let sandbox_id = self.require_started("run command in")?;
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        let request = RunCommand {
            command,
            args: &args,
            timeout_seconds: timeout.map(timeout_seconds),
        };

        let began = Instant::now();
        let response = self
            .transport
            .post(&[sandbox_id, "command"], &request, timeout)
            .await?;
        let execution = CommandExecution::from_response(
            response,
            Some((command, args.as_slice())),
            Some(began.elapsed()),
        );

        debug!(
            sandbox_id = %sandbox_id,
            command,
            exit_code = ?execution.exit_code(),
            "command finished"
        );
        Ok(execution)
    }

    /// Fetch a fresh resource-usage snapshot.
    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        let sandbox_id = self.require_started("read metrics of")?;
        let response = self.transport.get(&[sandbox_id, "metrics"]).await?;
        Ok(MetricsSnapshot::from_value(response))
    }

    /// Reader with per-field getters; each getter is its own round trip.
    pub fn metrics_reader(&self) -> Metrics<'_> {
        Metrics::new(self)
    }

    /// Install packages with the language's package manager
    /// (`pip install` / `npm install`).
    pub async fn install_packages<S: AsRef<str>>(
        &self,
        packages: &[S],
    ) -> Result<CommandExecution> {
        let language = self.language_for("install packages")?;
        if packages.is_empty() {
            return Err(ClientError::InvalidConfig(
                "no packages to install".to_string(),
            ));
        }
        let (program, subcommand) = language.install_command();
        let mut args = vec![subcommand.to_string()];
        args.extend(packages.iter().map(|p| p.as_ref().to_string()));
        self.run_command(program, &args).await
    }

    /// Ask the runtime for its version (`python --version` / `node --version`).
    pub async fn runtime_version(&self) -> Result<CommandExecution> {
        let language = self.language_for("query runtime version")?;
        self.run_command(language.version_program(), &["--version"])
            .await
    }

    fn language_for(&self, what: &str) -> Result<Language> {
        self.options.language.ok_or_else(|| {
            ClientError::InvalidConfig(format!("cannot {what}: session has no language"))
        })
    }

    /// Start the sandbox, run `body` against it, and stop it on every exit
    /// path.
    ///
    /// An error from `body` wins over an error from `stop` (the latter is
    /// logged). A panic in `body` is re-raised after the sandbox is stopped.
    ///
    /// ```no_run
    /// # async fn demo() -> msb_client::Result<()> {
    /// use msb_client::{Sandbox, StartOptions};
    ///
    /// let answer = Sandbox::python()?
    ///     .run_scoped(StartOptions::default(), async |sb: &Sandbox| {
    ///         let exec = sb.run_code("print(21 * 2)").await?;
    ///         Ok::<_, msb_client::ClientError>(exec.output().trim().to_string())
    ///     })
    ///     .await?;
    /// assert_eq!(answer, "42");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_scoped<T, E, F>(
        mut self,
        options: StartOptions,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: AsyncFnOnce(&Sandbox) -> std::result::Result<T, E>,
        E: From<ClientError>,
    {
        self.start(options).await?;

        let outcome = AssertUnwindSafe(body(&self)).catch_unwind().await;
        let stopped = self.stop().await;

        match outcome {
            Ok(Ok(value)) => {
                stopped?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "sandbox stop failed after body error");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "sandbox stop failed after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Lifecycle::Started { sandbox_id } = &self.lifecycle {
            warn!(
                name = %self.options.name,
                sandbox_id = %sandbox_id,
                "sandbox handle dropped while started; remote sandbox was not stopped"
            );
        }
    }
}
