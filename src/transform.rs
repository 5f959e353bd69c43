//! Out-of-process JSON transformation: runs an external filter command
//! (jq-style) over a rendered document, off the control thread, with
//! last-request-wins bookkeeping for stale completions.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Command line for the filter program; split with shell-like rules.
    /// The query is appended as the final argument.
    pub command: String,
    pub timeout: Duration,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self { command: "jq -e -r --".to_string(), timeout: Duration::from_millis(2_000) }
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transform command not available")]
    Missing,
    #[error("invalid command line: {0}")]
    InvalidCommandLine(String),
    #[error("transform failed: {0}")]
    Failed(String),
    #[error("transform timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the configured command with the document on stdin and the query as
/// the final argument. `Ok(None)` means the filter produced no output.
pub fn run_transform(
    config: &TransformConfig,
    input: &str,
    query: &str,
) -> Result<Option<String>, TransformError> {
    let parts = shlex::split(&config.command)
        .ok_or_else(|| TransformError::InvalidCommandLine(config.command.clone()))?;
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| TransformError::InvalidCommandLine(config.command.clone()))?;

    let stdout_file = NamedTempFile::new()?;
    let stderr_file = NamedTempFile::new()?;
    let stdout = stdout_file.reopen()?;
    let stderr = stderr_file.reopen()?;

    let spawned = Command::new(program)
        .args(args)
        .arg(query)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(error) => {
            if error.kind() == std::io::ErrorKind::NotFound {
                return Err(TransformError::Missing);
            }
            return Err(TransformError::Failed(error.to_string()));
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() >= config.timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransformError::Timeout);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let mut stdout_bytes = Vec::new();
    stdout_file.reopen()?.read_to_end(&mut stdout_bytes)?;
    let stdout = String::from_utf8_lossy(&stdout_bytes).trim().to_string();

    if status.success() {
        if stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(stdout))
        }
    } else {
        let mut stderr_bytes = Vec::new();
        stderr_file.reopen()?.read_to_end(&mut stderr_bytes)?;
        if stderr_bytes.is_empty() {
            Ok(None)
        } else {
            Err(TransformError::Failed(String::from_utf8_lossy(&stderr_bytes).to_string()))
        }
    }
}

/// Control-thread bookkeeping for in-flight transform requests. Requests
/// take a token; only the newest token's completion is accepted and stale
/// results are dropped rather than applied.
#[derive(Debug, Default)]
pub struct TransformTracker {
    next_token: u64,
    latest: Option<u64>,
}

impl TransformTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request, superseding anything still in flight.
    pub fn begin(&mut self) -> u64 {
        self.next_token += 1;
        self.latest = Some(self.next_token);
        self.next_token
    }

    /// Whether a completed request's result should be applied.
    pub fn accept(&mut self, token: u64) -> bool {
        match self.latest {
            Some(latest) if latest == token => {
                self.latest = None;
                true
            }
            _ => {
                debug!(token, "discarding stale transform result");
                false
            }
        }
    }

    pub fn cancel_all(&mut self) {
        self.latest = None;
    }

    pub fn in_flight(&self) -> bool {
        self.latest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_feeds_stdin_and_captures_stdout() {
        let config = TransformConfig {
            command: "tr a-z".to_string(),
            timeout: Duration::from_secs(5),
        };
        let result = run_transform(&config, "hello", "A-Z").expect("run tr");
        assert_eq!(result.as_deref(), Some("HELLO"));
    }

    #[test]
    fn missing_command_is_reported_as_missing() {
        let config = TransformConfig {
            command: "definitely-not-an-installed-binary".to_string(),
            timeout: Duration::from_secs(1),
        };
        let result = run_transform(&config, "{}", ".");
        assert!(matches!(result, Err(TransformError::Missing)));
    }

    #[test]
    fn empty_command_line_is_invalid() {
        let config = TransformConfig { command: String::new(), timeout: Duration::from_secs(1) };
        let result = run_transform(&config, "{}", ".");
        assert!(matches!(result, Err(TransformError::InvalidCommandLine(_))));
    }

    #[test]
    fn tracker_applies_only_the_newest_request() {
        let mut tracker = TransformTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();

        // The stale completion arrives first and is dropped.
        assert!(!tracker.accept(first));
        assert!(tracker.in_flight());
        assert!(tracker.accept(second));
        assert!(!tracker.in_flight());

        // A completion with no matching request is ignored.
        assert!(!tracker.accept(second));
    }

    #[test]
    fn cancel_all_drops_the_in_flight_request() {
        let mut tracker = TransformTracker::new();
        let token = tracker.begin();
        tracker.cancel_all();
        assert!(!tracker.accept(token));
    }
}
