//! Shell command execution.
//!
//! A job's command is an opaque string handed to the platform shell. It
//! is not parsed or sandboxed: whoever can enqueue a job can run
//! anything the worker's user can.

use std::future::Future;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Bytes of captured output kept in `last_error`.
pub const MAX_DIAGNOSTIC_BYTES: usize = 1024;

/// Shortest heartbeat period the executor will tick at.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Read size when draining a child's pipes.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Result of running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The command exited with status zero.
    Succeeded,
    /// The command ran and exited unsuccessfully.
    Failed {
        /// Exit code, or `None` if the process was killed by a signal.
        exit_code: Option<i32>,
        /// Tail of the captured stderr (or stdout when stderr is empty).
        diagnostic: String,
    },
    /// The shell itself could not be started or waited on.
    LaunchFailed { message: String },
}

impl ExecutionOutcome {
    /// Returns true if the command succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded)
    }

    /// Returns the human-readable failure cause recorded as `last_error`.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            ExecutionOutcome::Succeeded => None,
            ExecutionOutcome::Failed {
                exit_code,
                diagnostic,
            } => {
                let cause = match exit_code {
                    Some(code) => format!("exit_code={code}"),
                    None => "terminated by signal".to_string(),
                };
                if diagnostic.is_empty() {
                    Some(cause)
                } else {
                    Some(format!("{cause}: {diagnostic}"))
                }
            }
            ExecutionOutcome::LaunchFailed { message } => Some(format!("launch failed: {message}")),
        }
    }
}

/// Runs job commands through the host shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    flag: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("sh", "-c")
        }
    }
}

impl ShellExecutor {
    /// Creates an executor that runs `<shell> <flag> <command>`.
    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }

    /// Runs `command` to completion, calling `heartbeat` every
    /// `heartbeat_every` while it is still running.
    ///
    /// The command's stdout is passed through to the worker's stdout. Only
    /// the last [`MAX_DIAGNOSTIC_BYTES`] of each stream are held in memory.
    /// The command is never interrupted; a hung command blocks until it exits.
    pub async fn execute<F, Fut>(
        &self,
        command: &str,
        heartbeat_every: Duration,
        mut heartbeat: F,
    ) -> ExecutionOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut child = match self.spawn(command) {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::LaunchFailed {
                    message: e.to_string(),
                }
            }
        };

        let period = heartbeat_every.max(MIN_HEARTBEAT_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                drain(stdout, Some(tokio::io::stdout())),
                drain(stderr, None::<tokio::io::Stdout>),
            );
            status.map(|status| (status, stdout, stderr))
        };
        tokio::pin!(finished);

        loop {
            tokio::select! {
                result = &mut finished => return Self::outcome(result),
                _ = ticker.tick() => heartbeat().await,
            }
        }
    }

    fn spawn(&self, command: &str) -> io::Result<Child> {
        let mut cmd = std::process::Command::new(&self.shell);
        cmd.arg(&self.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group: a terminal interrupt aimed at the queue must
        // not reach the command it is running.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        Command::from(cmd).spawn()
    }

    fn outcome(result: io::Result<(ExitStatus, OutputTail, OutputTail)>) -> ExecutionOutcome {
        let (status, stdout, stderr) = match result {
            Ok(finished) => finished,
            Err(e) => {
                return ExecutionOutcome::LaunchFailed {
                    message: e.to_string(),
                }
            }
        };

        debug!(
            exit_code = ?status.code(),
            stdout_len = stdout.total,
            stderr_len = stderr.total,
            "command finished"
        );

        if status.success() {
            return ExecutionOutcome::Succeeded;
        }

        let captured = if stderr.is_blank() { &stdout } else { &stderr };

        ExecutionOutcome::Failed {
            exit_code: status.code(),
            diagnostic: captured.text(),
        }
    }
}

/// The last few bytes written to one of a command's streams.
#[derive(Debug)]
struct OutputTail {
    buf: Vec<u8>,
    limit: usize,
    /// Bytes seen, including those already discarded.
    total: usize,
    blank: bool,
}

impl OutputTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
            total: 0,
            blank: true,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.total = self.total.saturating_add(chunk.len());
        self.blank = self.blank && chunk.iter().all(u8::is_ascii_whitespace);

        if chunk.len() >= self.limit {
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.limit);
        self.buf.drain(..overflow);
        self.buf.extend_from_slice(chunk);
    }

    /// True if nothing but whitespace was ever written.
    fn is_blank(&self) -> bool {
        self.blank
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf).trim().to_string()
    }
}

/// Reads `reader` to EOF, keeping its tail and copying it to `forward`.
///
/// Forwarding stops at the first write error; reading continues so the
/// child never blocks on a full pipe.
async fn drain<R, W>(reader: Option<R>, mut forward: Option<W>) -> OutputTail
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tail = OutputTail::new(MAX_DIAGNOSTIC_BYTES);
    let Some(mut reader) = reader else {
        return tail;
    };

    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "Failed to read command output");
                break;
            }
        };
        tail.push(&chunk[..read]);

        if let Some(out) = forward.as_mut() {
            if out.write_all(&chunk[..read]).await.is_err() {
                forward = None;
            }
        }
    }

    if let Some(mut out) = forward {
        let _ = out.flush().await;
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formats() {
        let failed = ExecutionOutcome::Failed {
            exit_code: Some(2),
            diagnostic: String::new(),
        };
        assert_eq!(failed.error_message().unwrap(), "exit_code=2");

        let with_output = ExecutionOutcome::Failed {
            exit_code: Some(1),
            diagnostic: "boom".into(),
        };
        assert_eq!(with_output.error_message().unwrap(), "exit_code=1: boom");

        let launch = ExecutionOutcome::LaunchFailed {
            message: "No such file".into(),
        };
        assert!(launch.error_message().unwrap().starts_with("launch failed"));
        assert!(ExecutionOutcome::Succeeded.error_message().is_none());
    }

    #[test]
    fn test_tail_keeps_the_end() {
        let mut tail = OutputTail::new(4);
        tail.push(b"0123");
        tail.push(b"456");
        tail.push(b"789");
        assert_eq!(tail.text(), "6789");
        assert_eq!(tail.total, 10);

        let mut short = OutputTail::new(100);
        short.push(b"  short \n");
        assert_eq!(short.text(), "short");
    }

    #[test]
    fn test_tail_memory_is_bounded() {
        let mut tail = OutputTail::new(MAX_DIAGNOSTIC_BYTES);
        let chunk = vec![b'y'; READ_CHUNK_BYTES];
        for _ in 0..(64 * 1024 * 1024 / READ_CHUNK_BYTES) {
            tail.push(&chunk);
        }
        tail.push(b"end");

        assert_eq!(tail.total, 64 * 1024 * 1024 + 3);
        assert_eq!(tail.buf.len(), MAX_DIAGNOSTIC_BYTES);
        assert!(tail.buf.capacity() <= 2 * MAX_DIAGNOSTIC_BYTES);
        assert!(tail.text().ends_with("yyyend"));
    }

    #[test]
    fn test_tail_blank_tracks_whole_stream() {
        let mut tail = OutputTail::new(4);
        assert!(tail.is_blank());
        tail.push(b"err");
        tail.push(b"\n\n\n\n\n");
        assert!(!tail.is_blank());
        assert_eq!(tail.text(), "");
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};

        async fn run(command: &str) -> ExecutionOutcome {
            ShellExecutor::default()
                .execute(command, Duration::from_secs(60), || async {})
                .await
        }

        #[tokio::test]
        async fn test_successful_command() {
            assert_eq!(run("true").await, ExecutionOutcome::Succeeded);
        }

        #[tokio::test]
        async fn test_exit_code_is_captured() {
            let outcome = run("exit 3").await;
            assert_eq!(
                outcome,
                ExecutionOutcome::Failed {
                    exit_code: Some(3),
                    diagnostic: String::new(),
                }
            );
        }

        #[tokio::test]
        async fn test_stderr_is_captured() {
            let outcome = run("echo progress; echo boom >&2; exit 1").await;
            assert_eq!(outcome.error_message().unwrap(), "exit_code=1: boom");
        }

        #[tokio::test]
        async fn test_stdout_used_when_stderr_empty() {
            let outcome = run("echo only-stdout; exit 4").await;
            assert_eq!(outcome.error_message().unwrap(), "exit_code=4: only-stdout");
        }

        #[tokio::test]
        async fn test_command_not_found_is_a_failure() {
            let outcome = run("definitely-not-a-real-command-queuectl").await;
            match outcome {
                ExecutionOutcome::Failed { exit_code, .. } => assert_eq!(exit_code, Some(127)),
                other => panic!("expected failure, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_missing_shell_is_launch_failure() {
            let executor = ShellExecutor::with_shell("/nonexistent/queuectl-shell", "-c");
            let outcome = executor
                .execute("true", Duration::from_secs(60), || async {})
                .await;
            assert!(matches!(outcome, ExecutionOutcome::LaunchFailed { .. }));
        }

        #[tokio::test]
        async fn test_long_output_is_truncated() {
            let outcome = run("head -c 5000 /dev/zero | tr '\\0' x >&2; exit 1").await;
            let ExecutionOutcome::Failed { diagnostic, .. } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(diagnostic.len(), MAX_DIAGNOSTIC_BYTES);
        }

        #[tokio::test]
        async fn test_large_output_is_streamed_not_buffered() {
            let outcome = run("head -c 50000000 /dev/zero | tr '\\0' y >&2; exit 1").await;
            let ExecutionOutcome::Failed { diagnostic, .. } = outcome else {
                panic!("expected failure");
            };
            assert_eq!(diagnostic.len(), MAX_DIAGNOSTIC_BYTES);
            assert!(diagnostic.bytes().all(|b| b == b'y'));
        }

        #[tokio::test]
        async fn test_drain_forwards_everything_and_keeps_tail() {
            let input: Vec<u8> = b"abcdefghijklmnopqrstuvwxyz"
                .iter()
                .copied()
                .cycle()
                .take(20_000)
                .collect();
            let mut forwarded = Vec::new();

            let tail = drain(Some(&input[..]), Some(&mut forwarded)).await;

            assert_eq!(forwarded, input);
            assert_eq!(tail.total, input.len());
            assert_eq!(tail.buf, input[input.len() - MAX_DIAGNOSTIC_BYTES..]);
        }

        #[tokio::test]
        async fn test_heartbeat_ticks_while_running() {
            let counter = AtomicUsize::new(0);
            let ticks = &counter;
            let outcome = ShellExecutor::default()
                .execute("sleep 0.5", Duration::from_millis(100), move || async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                })
                .await;

            assert!(outcome.is_success());
            assert!(counter.load(Ordering::SeqCst) >= 2);
        }

        #[tokio::test]
        async fn test_command_does_not_read_worker_stdin() {
            assert!(run("cat").await.is_success());
        }
    }
}
