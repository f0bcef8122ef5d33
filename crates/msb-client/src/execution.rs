//! Outcome objects for code and command runs.
//!
//! Both types are immutable snapshots of one response. A program that failed
//! inside the sandbox yields `is_success() == false` with populated
//! `error_output()`; it is never turned into a [`ClientError`](crate::ClientError).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::Aliases;

const OUTPUT: Aliases = Aliases(&["output", "stdout", "result"]);
const ERROR: Aliases = Aliases(&["error", "stderr"]);
const STATUS: Aliases = Aliases(&["status"]);
const SUCCESS: Aliases = Aliases(&["success"]);
const EXIT_CODE: Aliases = Aliases(&["exitCode", "exit_code", "code"]);
const EXECUTION_TIME: Aliases = Aliases(&["executionTime", "executionTimeMs", "duration"]);
const EXECUTION_ID: Aliases = Aliases(&["executionId", "requestId"]);
const COMMAND: Aliases = Aliases(&["command"]);

/// Server-reported state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Error,
    Timeout,
    /// The server sent no status.
    Unknown,
    /// A status this client does not know by name.
    Other(String),
}

impl ExecutionStatus {
    fn from_payload(payload: &Value) -> Self {
        match STATUS.text(payload) {
            None => ExecutionStatus::Unknown,
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "completed" | "success" | "ok" => ExecutionStatus::Completed,
                "error" | "failed" => ExecutionStatus::Error,
                "timeout" | "timed_out" => ExecutionStatus::Timeout,
                _ => ExecutionStatus::Other(s.to_string()),
            },
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Error | ExecutionStatus::Timeout)
    }
}

/// Captured stdout/stderr of one run.
struct Streams {
    output: String,
    error: String,
}

impl Streams {
    /// Accepts either plain output/error strings or an output array of
    /// `{stream, text}` line records, under any of the output aliases.
    fn from_payload(payload: &Value) -> Self {
        if let Some(lines) = OUTPUT.array(payload) {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            for line in lines {
                let text = line.get("text").and_then(Value::as_str).unwrap_or("");
                match line.get("stream").and_then(Value::as_str) {
                    Some("stderr") => stderr.push(text),
                    _ => stdout.push(text),
                }
            }
            let error = if stderr.is_empty() {
                ERROR.text(payload).unwrap_or_default().to_string()
            } else {
                stderr.join("\n")
            };
            return Streams {
                output: stdout.join("\n"),
                error,
            };
        }

        Streams {
            output: OUTPUT.text(payload).unwrap_or_default().to_string(),
            error: ERROR.text(payload).unwrap_or_default().to_string(),
        }
    }
}

fn execution_time_ms(payload: &Value, observed: Option<Duration>) -> Option<u64> {
    EXECUTION_TIME
        .integer(payload)
        .filter(|ms| *ms >= 0)
        .map(|ms| ms as u64)
        .or_else(|| observed.map(|d| d.as_millis() as u64))
}

fn exit_code(payload: &Value) -> Option<i32> {
    EXIT_CODE.integer(payload).map(|c| c as i32)
}

/// Result of running a piece of source code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    output: String,
    error_output: String,
    success: bool,
    status: ExecutionStatus,
    exit_code: Option<i32>,
    execution_time_ms: Option<u64>,
    execution_id: Option<String>,
    #[serde(skip)]
    raw: Value,
}

impl Execution {
    /// Build from a raw response payload.
    pub fn from_value(payload: Value) -> Self {
        Self::from_response(payload, None)
    }

    pub(crate) fn from_response(payload: Value, observed: Option<Duration>) -> Self {
        let streams = Streams::from_payload(&payload);
        let status = ExecutionStatus::from_payload(&payload);
        let exit_code = exit_code(&payload);

        let failed = status.is_failure()
            || !streams.error.is_empty()
            || SUCCESS.flag(&payload) == Some(false)
            || exit_code.is_some_and(|c| c != 0);

        Execution {
            success: !failed,
            execution_time_ms: execution_time_ms(&payload, observed),
            execution_id: EXECUTION_ID.text(&payload).map(str::to_string),
            output: streams.output,
            error_output: streams.error,
            status,
            exit_code,
            raw: payload,
        }
    }

    /// Captured standard output.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Captured standard error or exception trace; empty when none.
    pub fn error_output(&self) -> &str {
        &self.error_output
    }

    /// `true` when the program finished without a runtime error.
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn has_error(&self) -> bool {
        !self.success
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Server-reported duration, or the client-observed round trip.
    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    /// The payload exactly as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Result of running a shell command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandExecution {
    command: String,
    args: Vec<String>,
    output: String,
    error_output: String,
    success: bool,
    status: ExecutionStatus,
    exit_code: Option<i32>,
    execution_time_ms: Option<u64>,
    execution_id: Option<String>,
    #[serde(skip)]
    raw: Value,
}

impl CommandExecution {
    /// Build from a raw response payload.
    pub fn from_value(payload: Value) -> Self {
        Self::from_response(payload, None, None)
    }

    /// `request` is the command line that was sent; the payload's own
    /// `command`/`args` take precedence when present.
    pub(crate) fn from_response(
        payload: Value,
        request: Option<(&str, &[String])>,
        observed: Option<Duration>,
    ) -> Self {
        let streams = Streams::from_payload(&payload);
        let status = ExecutionStatus::from_payload(&payload);
        let exit_code = exit_code(&payload);

        let success = !matches!(status, ExecutionStatus::Timeout)
            && exit_code
                .map(|c| c == 0)
                .or_else(|| SUCCESS.flag(&payload))
                .unwrap_or_else(|| !status.is_failure() && streams.error.is_empty());

        let command = COMMAND
            .text(&payload)
            .map(str::to_string)
            .or_else(|| request.map(|(cmd, _)| cmd.to_string()))
            .unwrap_or_default();

        let args = match payload.get("args").and_then(Value::as_array) {
            Some(values) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            None => request.map(|(_, args)| args.to_vec()).unwrap_or_default(),
        };

        CommandExecution {
            command,
            args,
            success,
            execution_time_ms: execution_time_ms(&payload, observed),
            execution_id: EXECUTION_ID.text(&payload).map(str::to_string),
            output: streams.output,
            error_output: streams.error,
            status,
            exit_code,
            raw: payload,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Standard output of the command.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Standard error of the command.
    pub fn error_output(&self) -> &str {
        &self.error_output
    }

    /// Exit code, when the server reported one.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// `true` when the command exited with status zero.
    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn timed_out(&self) -> bool {
        self.status == ExecutionStatus::Timeout
    }

    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_successful_code_run() {
        let exec = Execution::from_value(json!({
            "status": "completed",
            "output": "42\n",
            "executionTime": 12,
            "executionId": "exec-1"
        }));
        assert!(exec.is_success());
        assert_eq!(exec.output(), "42\n");
        assert_eq!(exec.error_output(), "");
        assert_eq!(exec.execution_time_ms(), Some(12));
        assert_eq!(exec.execution_id(), Some("exec-1"));
        assert_eq!(exec.status(), &ExecutionStatus::Completed);
    }

    #[test]
    fn test_runtime_error_is_data_not_failure() {
        let exec = Execution::from_value(json!({
            "status": "error",
            "output": "",
            "error": "ZeroDivisionError: division by zero"
        }));
        assert!(!exec.is_success());
        assert!(exec.has_error());
        assert!(exec.error_output().contains("ZeroDivisionError"));
    }

    #[test]
    fn test_stderr_without_status_marks_failure() {
        let exec = Execution::from_value(json!({"stdout": "partial", "stderr": "Traceback"}));
        assert_eq!(exec.output(), "partial");
        assert!(!exec.is_success());
        assert_eq!(exec.status(), &ExecutionStatus::Unknown);
    }

    #[test]
    fn test_explicit_success_false_and_exit_code() {
        assert!(!Execution::from_value(json!({"output": "", "success": false})).is_success());
        assert!(!Execution::from_value(json!({"output": "", "exitCode": 1})).is_success());
        assert!(Execution::from_value(json!({"output": "ok", "exitCode": 0})).is_success());
    }

    #[test]
    fn test_line_records_are_split_by_stream() {
        let exec = Execution::from_value(json!({
            "output": [
                {"stream": "stdout", "text": "one"},
                {"stream": "stderr", "text": "warn"},
                {"stream": "stdout", "text": "two"}
            ]
        }));
        assert_eq!(exec.output(), "one\ntwo");
        assert_eq!(exec.error_output(), "warn");
    }

    #[test]
    fn test_line_records_under_stdout_key() {
        let exec = Execution::from_value(json!({
            "stdout": [
                {"stream": "stdout", "text": "hello"},
                {"stream": "stdout", "text": "world"}
            ],
            "status": "completed"
        }));
        assert_eq!(exec.output(), "hello\nworld");
        assert_eq!(exec.error_output(), "");
        assert!(exec.is_success());

        let cmd = CommandExecution::from_value(json!({
            "stdout": [{"stream": "stdout", "text": "total 0"}],
            "exitCode": 0
        }));
        assert_eq!(cmd.output(), "total 0");
    }

    #[test]
    fn test_observed_duration_fills_missing_time() {
        let exec = Execution::from_response(
            json!({"output": "x"}),
            Some(Duration::from_millis(250)),
        );
        assert_eq!(exec.execution_time_ms(), Some(250));
        assert_eq!(Execution::from_value(json!({})).execution_time_ms(), None);
    }

    #[test]
    fn test_command_success_follows_exit_code() {
        // pip writes warnings to stderr while still succeeding
        let cmd = CommandExecution::from_value(json!({
            "command": "pip",
            "args": ["install", "requests"],
            "stdout": "Successfully installed requests",
            "stderr": "WARNING: pip is out of date",
            "exitCode": 0
        }));
        assert!(cmd.is_success());
        assert_eq!(cmd.command(), "pip");
        assert_eq!(cmd.args(), ["install", "requests"]);
        assert_eq!(cmd.error_output(), "WARNING: pip is out of date");

        let failed = CommandExecution::from_value(json!({"exit_code": 2, "stderr": "no such file"}));
        assert!(!failed.is_success());
        assert_eq!(failed.exit_code(), Some(2));
    }

    #[test]
    fn test_command_timeout_is_failure() {
        let cmd = CommandExecution::from_value(json!({"status": "timeout", "exitCode": 0}));
        assert!(cmd.timed_out());
        assert!(!cmd.is_success());
    }

    #[test]
    fn test_command_falls_back_to_request_line() {
        let args = vec!["-la".to_string()];
        let cmd = CommandExecution::from_response(
            json!({"output": "total 0", "exitCode": 0}),
            Some(("ls", args.as_slice())),
            None,
        );
        assert_eq!(cmd.command(), "ls");
        assert_eq!(cmd.args(), ["-la"]);
    }

    #[test]
    fn test_unknown_status_is_kept() {
        let exec = Execution::from_value(json!({"status": "queued", "output": ""}));
        assert_eq!(exec.status(), &ExecutionStatus::Other("queued".into()));
        assert!(exec.is_success());
    }
}
