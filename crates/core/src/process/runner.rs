//! Supervised execution of external commands.

use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use super::types::{
    CommandEvent, CommandEventSender, CommandId, CommandInvocationResult, CommandRequest,
    OutputStream,
};

/// Runs external commands and reports their lifecycle.
///
/// `run` never fails: spawn errors, non-zero exits and timeouts all come
/// back as a [`CommandInvocationResult`] with `success == false`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Runs `request` to completion, sending lifecycle events to `events`.
    pub async fn run(
        &self,
        request: CommandRequest,
        events: Option<&CommandEventSender>,
    ) -> CommandInvocationResult {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new(request.command_id.clone(), events);

        let command_line = request.display();
        debug!("[{}] Executing: {}", request.command_id, command_line);
        lifecycle.notify(CommandEvent::Started {
            command_id: request.command_id.clone(),
            command_line,
        });

        let spawned = Command::new(&request.program)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("Command not found: {}", request.program.display())
                } else {
                    format!("Failed to spawn {}: {}", request.program.display(), e)
                };
                warn!("[{}] {}", request.command_id, message);
                lifecycle.resolve(CommandEvent::Errored {
                    command_id: request.command_id.clone(),
                    message: message.clone(),
                });
                return CommandInvocationResult {
                    command_id: request.command_id,
                    success: false,
                    exit_code: None,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    error: Some(message),
                    timed_out: false,
                };
            }
        };

        lifecycle.notify(CommandEvent::Running {
            command_id: request.command_id.clone(),
            pid: child.id(),
        });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stdout_lines = Vec::new();
        let mut stderr_lines = Vec::new();

        let outcome = {
            let pump = pump_output(
                &mut child,
                stdout,
                stderr,
                &lifecycle,
                &mut stdout_lines,
                &mut stderr_lines,
            );
            match request.timeout {
                Some(limit) => tokio::time::timeout(limit, pump).await.ok(),
                None => Some(pump.await),
            }
        };

        let (success, exit_code, error, timed_out) = match outcome {
            Some(Ok(status)) => {
                let code = status.code();
                lifecycle.resolve(CommandEvent::Finished {
                    command_id: request.command_id.clone(),
                    exit_code: code,
                    success: status.success(),
                });
                let error = if status.success() {
                    None
                } else {
                    Some(match code {
                        Some(code) => format!("Process exited with code {}", code),
                        None => "Process terminated by signal".to_string(),
                    })
                };
                (status.success(), code, error, false)
            }
            Some(Err(e)) => {
                let _ = child.kill().await;
                let message = format!("Failed while waiting for process: {}", e);
                lifecycle.resolve(CommandEvent::Errored {
                    command_id: request.command_id.clone(),
                    message: message.clone(),
                });
                (false, None, Some(message), false)
            }
            None => {
                let _ = child.kill().await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(
                    "[{}] Timed out after {} ms, process killed",
                    request.command_id, elapsed_ms
                );
                lifecycle.resolve(CommandEvent::TimedOut {
                    command_id: request.command_id.clone(),
                    elapsed_ms,
                });
                (
                    false,
                    None,
                    Some(format!("Timed out after {} ms", elapsed_ms)),
                    true,
                )
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            "[{}] Completed in {} ms (success: {})",
            request.command_id, elapsed_ms, success
        );

        CommandInvocationResult {
            command_id: request.command_id,
            success,
            exit_code,
            elapsed_ms,
            stdout: stdout_lines,
            stderr: stderr_lines,
            error,
            timed_out,
        }
    }
}

/// Event gate for one invocation. Once a terminal event has been sent,
/// nothing else goes out.
struct Lifecycle<'a> {
    command_id: CommandId,
    events: Option<&'a CommandEventSender>,
    resolved: bool,
}

impl<'a> Lifecycle<'a> {
    fn new(command_id: CommandId, events: Option<&'a CommandEventSender>) -> Self {
        Self {
            command_id,
            events,
            resolved: false,
        }
    }

    fn notify(&self, event: CommandEvent) {
        if self.resolved {
            return;
        }
        if let Some(tx) = self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    fn message(&self, stream: OutputStream, line: &str) {
        self.notify(CommandEvent::MessageReceived {
            command_id: self.command_id.clone(),
            stream,
            line: line.to_string(),
        });
    }

    /// Sends `event` as the terminal event. Returns false if already resolved.
    fn resolve(&mut self, event: CommandEvent) -> bool {
        if self.resolved {
            return false;
        }
        self.notify(event);
        self.resolved = true;
        true
    }
}

async fn pump_output(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    lifecycle: &Lifecycle<'_>,
    stdout_lines: &mut Vec<String>,
    stderr_lines: &mut Vec<String>,
) -> std::io::Result<ExitStatus> {
    let mut out = stdout.map(LineReader::new);
    let mut err = stderr.map(LineReader::new);

    while out.is_some() || err.is_some() {
        tokio::select! {
            line = next_line(&mut out), if out.is_some() => match line {
                Some(line) => {
                    lifecycle.message(OutputStream::Stdout, &line);
                    stdout_lines.push(line);
                }
                None => out = None,
            },
            line = next_line(&mut err), if err.is_some() => match line {
                Some(line) => {
                    lifecycle.message(OutputStream::Stderr, &line);
                    stderr_lines.push(line);
                }
                None => err = None,
            },
        }
    }

    child.wait().await
}

/// Splits a pipe into lines without requiring UTF-8.
///
/// Tools print file tags in whatever encoding the file used, so invalid
/// bytes are replaced instead of ending the stream. Bytes read by a
/// cancelled call stay in `buf` and are completed by the next one.
struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.buf).await {
            Ok(0) if self.buf.is_empty() => None,
            Ok(_) => {
                let line = decode_line(&self.buf);
                self.buf.clear();
                Some(line)
            }
            Err(e) => {
                warn!("Failed to read process output: {}", e);
                None
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

async fn next_line<R: AsyncRead + Unpin>(reader: &mut Option<LineReader<R>>) -> Option<String> {
    match reader {
        Some(reader) => reader.next_line().await,
        None => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sh(script: &str) -> CommandRequest {
        CommandRequest::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<CommandEvent>) -> Vec<CommandEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_successful_command_captures_output() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = runner
            .run(sh("echo out1; echo err1 >&2; echo out2"), Some(&tx))
            .await;

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, vec!["out1", "out2"]);
        assert_eq!(result.stderr, vec!["err1"]);
        assert!(result.error.is_none());

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(CommandEvent::Started { .. })));
        assert!(matches!(events.get(1), Some(CommandEvent::Running { .. })));
        assert!(matches!(
            events.last(),
            Some(CommandEvent::Finished { success: true, .. })
        ));
        let messages = events
            .iter()
            .filter(|e| matches!(e, CommandEvent::MessageReceived { .. }))
            .count();
        assert_eq!(messages, 3);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_kept_and_drained() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = runner
            .run(
                sh("printf 'title=caf\\351\\n' >&2; sleep 0.2; \
                    for i in 1 2 3 4 5; do echo frame=$i >&2; done; \
                    printf 'no newline'"),
                Some(&tx),
            )
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stderr.len(), 6);
        assert_eq!(result.stderr[0], "title=caf\u{FFFD}");
        assert_eq!(result.stderr[5], "frame=5");
        assert_eq!(result.stdout, vec!["no newline"]);

        let messages = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, CommandEvent::MessageReceived { .. }))
            .count();
        assert_eq!(messages, 7);
    }

    #[test]
    fn test_decode_line_strips_line_endings() {
        assert_eq!(decode_line(b"frame=1\r\n"), "frame=1");
        assert_eq!(decode_line(b"tail"), "tail");
        assert_eq!(decode_line(b"a\xffb\n"), "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let runner = CommandRunner::new();
        let result = runner.run(sh("exit 3"), None).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
        assert_eq!(result.failure_summary(), "Process exited with code 3");
    }

    #[tokio::test]
    async fn test_missing_program_resolves_errored() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = runner
            .run(
                CommandRequest::new("/definitely/not/a/real/binary", vec![]),
                Some(&tx),
            )
            .await;

        assert!(!result.success);
        assert!(result.exit_code.is_none());
        assert!(result.error.unwrap().contains("not found"));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], CommandEvent::Started { .. }));
        assert!(matches!(events[1], CommandEvent::Errored { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = Instant::now();
        let result = runner
            .run(sh("echo begin; sleep 10").with_timeout_ms(200), Some(&tx))
            .await;

        assert!(started.elapsed().as_secs() < 5);
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.stdout, vec!["begin"]);

        let events = drain(&mut rx);
        let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], CommandEvent::TimedOut { .. }));
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_zero_timeout_disables_timer() {
        let runner = CommandRunner::new();
        let result = runner
            .run(sh("sleep 0.2; echo done").with_timeout_ms(0), None)
            .await;
        assert!(result.success);
        assert_eq!(result.stdout, vec!["done"]);
    }

    #[tokio::test]
    async fn test_events_carry_command_id() {
        let runner = CommandRunner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = CommandId::from("probe-42");

        runner
            .run(sh("echo hi").with_command_id(id.clone()), Some(&tx))
            .await;

        let events = drain(&mut rx);
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.command_id() == &id));
    }

    #[test]
    fn test_lifecycle_resolves_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = CommandId::from("c");
        let mut lifecycle = Lifecycle::new(id.clone(), Some(&tx));

        assert!(lifecycle.resolve(CommandEvent::Finished {
            command_id: id.clone(),
            exit_code: Some(0),
            success: true,
        }));
        assert!(!lifecycle.resolve(CommandEvent::TimedOut {
            command_id: id.clone(),
            elapsed_ms: 5,
        }));
        lifecycle.message(OutputStream::Stderr, "late line");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CommandEvent::Finished { .. }));
    }
}
