//! Subprocess ping execution.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::parser::{self, Dialect, PingStats};
use crate::storage::{LogLevel, LogStore};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to spawn ping")]
    Io(#[from] std::io::Error),

    #[error("ping did not finish within {0:?}")]
    Timeout(Duration),

    #[error("ping exited with {status}: {stderr}")]
    Exit {
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Runs the platform ping utility against one host at a time.
///
/// Every outcome converges to a [`PingStats`]: spawn errors, timeouts
/// and non-zero exits all become the failure shape, logged rather than
/// propagated, so one dead host never aborts a sweep.
pub struct ProbeRunner {
    dialect: Dialect,
    count: u32,
    timeout: Duration,
    program: String,
    logs: LogStore,
}

impl ProbeRunner {
    pub fn new(dialect: Dialect, count: u32, timeout: Duration, logs: LogStore) -> Self {
        Self {
            dialect,
            count,
            timeout,
            program: "ping".to_string(),
            logs,
        }
    }

    /// Override the ping binary, for tests.
    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Ping `host` and return its parsed statistics. Never fails; a
    /// probe that cannot run yields [`PingStats::probe_failure`].
    pub async fn probe(&self, host: &str) -> PingStats {
        match self.execute(host).await {
            Ok(stats) => {
                self.logs
                    .record(
                        LogLevel::Info,
                        "PING",
                        format!("ping statistics for {host}: {stats:?}"),
                        None,
                    )
                    .await;
                stats
            }
            Err(err) => {
                self.logs
                    .record(
                        LogLevel::Error,
                        "PING",
                        format!("ping failed for {host}: {err}"),
                        Some(error_chain(&err)),
                    )
                    .await;
                PingStats::probe_failure()
            }
        }
    }

    async fn execute(&self, host: &str) -> Result<PingStats, ProbeError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(self.dialect.count_flag())
            .arg(self.count.to_string())
            .arg(self.dialect.timeout_flag())
            .arg(self.dialect.timeout_value(self.timeout))
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Grace beyond the per-reply timeout so ping itself gets to
        // report total loss before we give up on the process.
        let hard_limit = self.timeout + Duration::from_secs(1);
        let output = tokio::time::timeout(hard_limit, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout(hard_limit))??;

        // ping exits non-zero for unreachable hosts even when it still
        // prints a summary; any non-zero exit is a probe failure.
        if !output.status.success() {
            return Err(ProbeError::Exit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parser::parse(&stdout, self.dialect))
    }
}

/// Render an error and its sources as one line per cause.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(&format!("\ncaused by: {cause}"));
        source = cause.source();
    }
    out
}
