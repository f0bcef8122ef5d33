//! Microsandbox CLI
//!
//! The `msb` command runs code or shell commands in a fresh remote sandbox
//! and tears it down afterwards.
//!
//! ## Commands
//!
//! - `run`: Run a code snippet or file in a language sandbox
//! - `exec`: Run a shell command with arguments
//! - `metrics`: Sample resource usage of a fresh sandbox

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use msb_client::{
    CommandExecution, Execution, Language, MetricsSnapshot, Sandbox, SandboxOptions, StartOptions,
    DEFAULT_CPU_COUNT, DEFAULT_MEMORY_MB, DEFAULT_NAMESPACE, DEFAULT_START_TIMEOUT,
};
use serde::Serialize;
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "msb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run code in ephemeral microsandbox sandboxes", long_about = None)]
struct Cli {
    /// Orchestrator base URL
    #[arg(long, env = "MSB_SERVER_URL", global = true)]
    server_url: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, env = "MSB_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Namespace the sandbox is created in
    #[arg(long, default_value = DEFAULT_NAMESPACE, global = true)]
    namespace: String,

    /// Sandbox name (generated when omitted)
    #[arg(long, global = true)]
    name: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Result format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
struct ResourceArgs {
    /// OCI image (defaults to the language image)
    #[arg(long)]
    image: Option<String>,

    /// Memory limit in MiB
    #[arg(long, default_value_t = DEFAULT_MEMORY_MB)]
    memory: u32,

    /// Number of virtual CPUs
    #[arg(long, default_value_t = DEFAULT_CPU_COUNT)]
    cpus: u32,

    /// Environment variable for the sandbox, repeatable
    #[arg(long = "env", value_name = "KEY=VALUE")]
    envs: Vec<String>,

    /// Seconds the server may take to create the sandbox
    #[arg(long, default_value_t = DEFAULT_START_TIMEOUT.as_secs())]
    start_timeout: u64,
}

impl ResourceArgs {
    fn start_options(&self) -> StartOptions {
        StartOptions {
            image: self.image.clone(),
            memory_mb: self.memory,
            cpu_count: self.cpus,
            envs: self.envs.clone(),
            timeout: Duration::from_secs(self.start_timeout),
            ..StartOptions::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run source code and print its output
    Run {
        /// Language runtime
        #[arg(long, default_value = "python")]
        lang: Language,

        #[command(flatten)]
        resources: ResourceArgs,

        /// Server-side execution bound in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Read the code from a file instead
        #[arg(short, long, conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Code to run
        #[arg(required_unless_present = "file")]
        code: Option<String>,
    },

    /// Run a shell command and print its output
    Exec {
        #[command(flatten)]
        resources: ResourceArgs,

        /// Server-side execution bound in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Program to run
        command: String,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start a sandbox and sample its resource usage
    Metrics {
        #[command(flatten)]
        resources: ResourceArgs,

        /// Number of samples to take
        #[arg(long, default_value_t = 1)]
        samples: u32,

        /// Delay between samples in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    msb_client::init_tracing(cli.json_logs, level);

    match &cli.command {
        Commands::Run {
            lang,
            resources,
            timeout,
            file,
            code,
        } => {
            let code = load_code(code.as_deref(), file.as_deref())?;
            let options = session_options(&cli, Some(*lang))?;
            cmd_run(
                options,
                resources.start_options(),
                &code,
                timeout.map(Duration::from_secs),
                cli.output,
            )
            .await
        }
        Commands::Exec {
            resources,
            timeout,
            command,
            args,
        } => {
            let options = session_options(&cli, None)?;
            cmd_exec(
                options,
                resources.start_options(),
                command,
                args,
                timeout.map(Duration::from_secs),
                cli.output,
            )
            .await
        }
        Commands::Metrics {
            resources,
            samples,
            interval_ms,
        } => {
            let options = session_options(&cli, None)?;
            cmd_metrics(
                options,
                resources.start_options(),
                *samples,
                Duration::from_millis(*interval_ms),
                cli.output,
            )
            .await
        }
    }
}

/// Connection options from global flags; clap has already applied the
/// `MSB_*` environment fallbacks.
fn session_options(cli: &Cli, language: Option<Language>) -> Result<SandboxOptions> {
    let mut builder = SandboxOptions::builder()
        .namespace(&cli.namespace)
        .ignore_env();
    if let Some(url) = &cli.server_url {
        builder = builder.server_url(url);
    }
    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(name) = &cli.name {
        builder = builder.name(name);
    }
    if let Some(language) = language {
        builder = builder.language(language);
    }
    builder.build().context("Invalid sandbox options")
}

fn load_code(code: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (code, file) {
        (_, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read code file: {:?}", path)),
        (Some(code), None) => Ok(code.to_string()),
        (None, None) => anyhow::bail!("No code given; pass CODE or --file"),
    }
}

fn exit_status(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to encode result")?;
    println!("{}", rendered);
    Ok(())
}

fn print_streams(output: &str, error_output: &str) {
    if !output.is_empty() {
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }
    if !error_output.is_empty() {
        eprint!("{}", error_output);
        if !error_output.ends_with('\n') {
            eprintln!();
        }
    }
}

async fn cmd_run(
    options: SandboxOptions,
    start: StartOptions,
    code: &str,
    timeout: Option<Duration>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let sandbox = Sandbox::new(options)?;
    debug!(name = sandbox.name(), "running code");

    let execution = sandbox
        .run_scoped(start, async |sb: &Sandbox| -> Result<Execution> {
            let execution = match timeout {
                Some(bound) => sb.run_code_with_timeout(code, bound).await,
                None => sb.run_code(code).await,
            };
            execution.context("Failed to run code")
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&execution)?,
        OutputFormat::Text => print_streams(execution.output(), execution.error_output()),
    }
    Ok(exit_status(execution.is_success()))
}

async fn cmd_exec(
    options: SandboxOptions,
    start: StartOptions,
    command: &str,
    args: &[String],
    timeout: Option<Duration>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let sandbox = Sandbox::new(options)?;
    debug!(name = sandbox.name(), command, "running command");

    let execution = sandbox
        .run_scoped(start, async |sb: &Sandbox| -> Result<CommandExecution> {
            let execution = match timeout {
                Some(bound) => sb.run_command_with_timeout(command, args, bound).await,
                None => sb.run_command(command, args).await,
            };
            execution.with_context(|| format!("Failed to run command '{}'", command))
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&execution)?,
        OutputFormat::Text => {
            print_streams(execution.output(), execution.error_output());
            if execution.timed_out() {
                eprintln!("command timed out");
            }
        }
    }
    Ok(exit_status(execution.is_success()))
}

async fn cmd_metrics(
    options: SandboxOptions,
    start: StartOptions,
    samples: u32,
    interval: Duration,
    format: OutputFormat,
) -> Result<ExitCode> {
    let samples = samples.max(1);
    let sandbox = Sandbox::new(options)?;

    let snapshots = sandbox
        .run_scoped(start, async |sb: &Sandbox| -> Result<Vec<MetricsSnapshot>> {
            let mut snapshots = Vec::with_capacity(samples as usize);
            for i in 0..samples {
                if i > 0 {
                    tokio::time::sleep(interval).await;
                }
                let snapshot = sb.metrics().await.context("Failed to read metrics")?;
                if format == OutputFormat::Text {
                    println!("{}", snapshot);
                }
                snapshots.push(snapshot);
            }
            Ok(snapshots)
        })
        .await?;

    if format == OutputFormat::Json {
        print_json(&snapshots)?;
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_inline_code() {
        let cli = Cli::try_parse_from([
            "msb",
            "--server-url",
            "http://10.0.0.5:5555",
            "run",
            "--lang",
            "node",
            "--memory",
            "1024",
            "console.log(1)",
        ])
        .unwrap();

        assert_eq!(cli.server_url.as_deref(), Some("http://10.0.0.5:5555"));
        match cli.command {
            Commands::Run {
                lang,
                resources,
                code,
                file,
                timeout,
            } => {
                assert_eq!(lang, Language::Node);
                assert_eq!(resources.memory, 1024);
                assert_eq!(resources.cpus, DEFAULT_CPU_COUNT);
                assert_eq!(code.as_deref(), Some("console.log(1)"));
                assert!(file.is_none());
                assert!(timeout.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_code_or_file() {
        assert!(Cli::try_parse_from(["msb", "run"]).is_err());
        assert!(Cli::try_parse_from(["msb", "run", "--file", "a.py", "print(1)"]).is_err());
    }

    #[test]
    fn test_parse_exec_keeps_hyphenated_args() {
        let cli = Cli::try_parse_from([
            "msb", "--output", "json", "exec", "--timeout", "5", "ls", "-la", "/tmp",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Exec {
                command,
                args,
                timeout,
                ..
            } => {
                assert_eq!(command, "ls");
                assert_eq!(args, vec!["-la", "/tmp"]);
                assert_eq!(timeout, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_metrics_defaults() {
        let cli = Cli::try_parse_from(["msb", "metrics", "--samples", "3"]).unwrap();
        match cli.command {
            Commands::Metrics {
                samples,
                interval_ms,
                resources,
            } => {
                assert_eq!(samples, 3);
                assert_eq!(interval_ms, 1000);
                assert_eq!(resources.memory, DEFAULT_MEMORY_MB);
                assert_eq!(resources.start_timeout, 180);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_session_options_from_flags() {
        let cli = Cli::try_parse_from([
            "msb",
            "--server-url",
            "http://sandbox.internal:5555",
            "--api-key",
            "k-123",
            "--namespace",
            "ci",
            "--name",
            "job-7",
            "exec",
            "true",
        ])
        .unwrap();

        let options = session_options(&cli, Some(Language::Python)).unwrap();
        assert_eq!(options.server_url().host_str(), Some("sandbox.internal"));
        assert_eq!(options.api_key(), Some("k-123"));
        assert_eq!(options.namespace(), "ci");
        assert_eq!(options.name(), "job-7");
        assert_eq!(options.language(), Some(Language::Python));
    }

    #[test]
    fn test_resource_args_map_to_start_options() {
        let resources = ResourceArgs {
            image: Some("python:3.12-slim".to_string()),
            memory: 256,
            cpus: 2,
            envs: vec!["DEBUG=1".to_string()],
            start_timeout: 600,
        };
        let start = resources.start_options();
        assert_eq!(start.image.as_deref(), Some("python:3.12-slim"));
        assert_eq!(start.memory_mb, 256);
        assert_eq!(start.cpu_count, 2);
        assert_eq!(start.envs, vec!["DEBUG=1"]);
        assert_eq!(start.timeout, Duration::from_secs(600));
        assert!(start.validate().is_ok());
    }

    #[test]
    fn test_load_code_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.py");
        std::fs::write(&script, "print('from file')\n").unwrap();

        let code = load_code(None, Some(&script)).unwrap();
        assert_eq!(code, "print('from file')\n");

        assert_eq!(load_code(Some("1 + 1"), None).unwrap(), "1 + 1");
        assert!(load_code(None, Some(&dir.path().join("missing.py"))).is_err());
    }
}
