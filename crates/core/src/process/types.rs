//! Types for supervised command invocations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identifier of one command invocation, carried by every event it emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Creates a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command to run.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub command_id: CommandId,
    /// Kill the process after this long. `None` disables the timer.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// Creates a request with a generated id and no timeout.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            command_id: CommandId::generate(),
            timeout: None,
        }
    }

    /// Uses the given id instead of a generated one.
    pub fn with_command_id(mut self, command_id: CommandId) -> Self {
        self.command_id = command_id;
        self
    }

    /// Sets the timeout in milliseconds; zero or negative disables it.
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout = if timeout_ms > 0 {
            Some(Duration::from_millis(timeout_ms as u64))
        } else {
            None
        };
        self
    }

    /// Renders the command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Lifecycle notification for one invocation.
///
/// Order is `Started`, `Running`, any number of `MessageReceived`, then
/// exactly one of `Finished`, `Errored` or `TimedOut`. `Errored` may follow
/// `Started` directly when the spawn itself fails.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    Started {
        command_id: CommandId,
        command_line: String,
    },
    Running {
        command_id: CommandId,
        pid: Option<u32>,
    },
    MessageReceived {
        command_id: CommandId,
        stream: OutputStream,
        line: String,
    },
    Finished {
        command_id: CommandId,
        exit_code: Option<i32>,
        success: bool,
    },
    Errored {
        command_id: CommandId,
        message: String,
    },
    TimedOut {
        command_id: CommandId,
        elapsed_ms: u64,
    },
}

impl CommandEvent {
    pub fn command_id(&self) -> &CommandId {
        match self {
            Self::Started { command_id, .. }
            | Self::Running { command_id, .. }
            | Self::MessageReceived { command_id, .. }
            | Self::Finished { command_id, .. }
            | Self::Errored { command_id, .. }
            | Self::TimedOut { command_id, .. } => command_id,
        }
    }

    /// Whether this is one of the three terminal events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Errored { .. } | Self::TimedOut { .. }
        )
    }
}

/// Channel on which lifecycle events are delivered.
pub type CommandEventSender = mpsc::UnboundedSender<CommandEvent>;

/// Outcome of one spawned process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocationResult {
    pub command_id: CommandId,
    /// True only when the process exited with code 0.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandInvocationResult {
    /// Stdout joined back into one string.
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    /// Last few stderr lines, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let start = self.stderr.len().saturating_sub(lines);
        self.stderr[start..].join("\n")
    }

    /// Short human-readable reason for a failed invocation.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            return format!("timed out after {} ms", self.elapsed_ms);
        }
        if let Some(ref error) = self.error {
            return error.clone();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}
