//! Timeout-aware task runner for long-running agent executions.
//!
//! The executor below this layer has no timeout awareness; the runner
//! imposes the command timeout and owns retry policy. A timed-out wait
//! triggers a reap sweep, then exactly one retry of the same request
//! by default. Non-timeout errors are terminal and never retried, and
//! a non-zero exit code is a completed result, not a retry trigger.

use std::time::Duration;

use tracing::{info, warn};

use super::error::SandboxError;
use super::exec::{ExecOutput, ExecRequest};
use super::lifecycle::Sandbox;
use super::reaper::{self, KillTarget};
use crate::runtime::ContainerRuntime;

/// Runs one request with a bounded wait, reaping and retrying on
/// timeout.
pub(crate) struct TaskRunner {
    command_timeout: Duration,
    max_retries: u32,
    targets: Vec<KillTarget>,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(20), 1)
    }
}

impl TaskRunner {
    pub fn new(command_timeout: Duration, max_retries: u32) -> Self {
        Self {
            command_timeout,
            max_retries,
            targets: reaper::DEFAULT_TARGETS.to_vec(),
        }
    }

    /// Overrides the kill catalog used when a wait times out.
    #[allow(dead_code)] // Public API for callers
    pub fn with_targets(mut self, targets: Vec<KillTarget>) -> Self {
        self.targets = targets;
        self
    }

    /// Submits the request and waits up to the command timeout.
    ///
    /// On timeout the reap sweep runs to completion before the retry
    /// is issued, so the retry never races processes still being torn
    /// down. After the retry budget is exhausted the timeout error
    /// propagates.
    pub async fn run<R: ContainerRuntime>(
        &self,
        sandbox: &Sandbox<R>,
        request: &ExecRequest,
    ) -> Result<ExecOutput, SandboxError> {
        let mut attempt: u32 = 0;
        loop {
            match tokio::time::timeout(self.command_timeout, sandbox.execute(request.clone()))
                .await
            {
                Ok(Ok(output)) => return Ok(output),
                // Runtime failure (sandbox vanished, transport error):
                // terminal, not retried.
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {
                    warn!(
                        "Command exceeded {}s timeout on attempt {}",
                        self.command_timeout.as_secs(),
                        attempt + 1
                    );
                    if attempt >= self.max_retries {
                        return Err(SandboxError::timeout(self.command_timeout));
                    }
                    reaper::reap(sandbox, &self.targets).await;
                    attempt += 1;
                    info!("Retrying command (attempt {})", attempt + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeRuntime;
    use crate::sandbox::lifecycle::SandboxSpec;

    async fn started_sandbox(fake: FakeRuntime) -> Sandbox<FakeRuntime> {
        fake.seed_running("swea");
        let mut sandbox = Sandbox::new(fake, SandboxSpec::default());
        sandbox.start().await.unwrap();
        sandbox
    }

    fn runner_with_short_timeout() -> TaskRunner {
        TaskRunner::new(Duration::from_millis(50), 1)
    }

    #[tokio::test]
    async fn test_completed_result_returned_verbatim() {
        let fake = FakeRuntime::new();
        fake.respond("make test", 2, "ran", "2 failures");
        let sandbox = started_sandbox(fake).await;

        let output = runner_with_short_timeout()
            .run(&sandbox, &ExecRequest::shell("make test"))
            .await
            .unwrap();

        // Non-zero exit is not a retry trigger.
        assert_eq!(output.exit_code, 2);
        assert_eq!(output.stderr, "2 failures");
        assert_eq!(
            sandbox
                .runtime()
                .commands()
                .iter()
                .filter(|c| c.contains("make test"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_reaps_once_then_retries_once() {
        let fake = FakeRuntime::new();
        // Hangs on every attempt.
        fake.hang("serve forever", Duration::from_millis(500));
        let sandbox = started_sandbox(fake).await;

        let err = runner_with_short_timeout()
            .run(&sandbox, &ExecRequest::shell("serve forever"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let commands = sandbox.runtime().commands();
        // Exactly one reap sweep, between the two attempts.
        assert_eq!(
            commands
                .iter()
                .filter(|c| c.contains("pkill -f 'bun dev'"))
                .count(),
            1
        );
        // Original attempt plus exactly one retry.
        assert_eq!(
            commands
                .iter()
                .filter(|c| c.contains("serve forever"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_retry_outcome_wins_after_port_freed() {
        let fake = FakeRuntime::new();
        // First attempt hangs on port 8080; after the reap the retry
        // completes and its result is returned.
        fake.hang_once("bind 8080", Duration::from_millis(500));
        fake.respond("bind 8080", 0, "served request\n", "");
        let sandbox = started_sandbox(fake).await;

        let output = runner_with_short_timeout()
            .run(&sandbox, &ExecRequest::shell("bind 8080"))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "served request\n");
        assert!(sandbox
            .runtime()
            .commands()
            .iter()
            .any(|c| c.contains("fuser -k 8080/tcp")));
    }

    #[tokio::test]
    async fn test_runtime_error_is_terminal() {
        let fake = FakeRuntime::new();
        fake.fail("flaky", "socket closed");
        let sandbox = started_sandbox(fake).await;

        let err = runner_with_short_timeout()
            .run(&sandbox, &ExecRequest::shell("flaky"))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Execution { .. }));

        let commands = sandbox.runtime().commands();
        // No reap, no retry.
        assert_eq!(commands.iter().filter(|c| c.contains("flaky")).count(), 1);
        assert!(!commands.iter().any(|c| c.contains("pkill")));
    }

    #[tokio::test]
    async fn test_zero_retries_fails_on_first_timeout() {
        let fake = FakeRuntime::new();
        fake.hang("stuck", Duration::from_millis(500));
        let sandbox = started_sandbox(fake).await;

        let err = TaskRunner::new(Duration::from_millis(50), 0)
            .run(&sandbox, &ExecRequest::shell("stuck"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let commands = sandbox.runtime().commands();
        assert_eq!(commands.iter().filter(|c| c.contains("stuck")).count(), 1);
        assert!(!commands.iter().any(|c| c.contains("pkill")));
    }
}
