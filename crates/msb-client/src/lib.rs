//! Microsandbox session client
//!
//! Creates remote, ephemeral sandboxes on a microsandbox orchestrator, runs
//! code and shell commands inside them, reads their resource usage and
//! tears them down.
//!
//! ```no_run
//! # async fn demo() -> msb_client::Result<()> {
//! use msb_client::{Sandbox, StartOptions};
//!
//! let mut sandbox = Sandbox::python()?;
//! sandbox.start(StartOptions::default()).await?;
//!
//! let run = sandbox.run_code("print(21 * 2)").await?;
//! println!("{}", run.output());
//!
//! sandbox.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod fields;
pub mod language;
pub mod metrics;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use config::{
    SandboxOptions, SandboxOptionsBuilder, StartOptions, StartOptionsBuilder, API_KEY_ENV,
    DEFAULT_CPU_COUNT, DEFAULT_MEMORY_MB, DEFAULT_NAMESPACE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SERVER_URL, DEFAULT_START_TIMEOUT, SERVER_URL_ENV,
};
pub use error::{ClientError, Result};
pub use execution::{CommandExecution, Execution, ExecutionStatus};
pub use fields::Aliases;
pub use language::Language;
pub use metrics::{Metrics, MetricsSnapshot};
pub use session::{Sandbox, SessionState};
pub use telemetry::init_tracing;
pub use transport::Transport;
