//! Codex CLI agent integration.
//!
//! Invokes the OpenAI Codex CLI inside the sandbox:
//! ```bash
//! codex exec "<prompt>" --yolo
//! ```
//!
//! The invocation runs through the task runner, so a hung agent is
//! reaped and retried rather than blocking forever.

use tracing::info;

use crate::config::AgentConfig;
use crate::runtime::ContainerRuntime;
use crate::sandbox::{ExecOutput, ExecRequest, Sandbox, SandboxError, TaskRunner};

/// Drives the in-sandbox Codex CLI for one generation task.
pub(crate) struct CodexAgent {
    runner: TaskRunner,
    workdir: String,
}

impl CodexAgent {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            runner: TaskRunner::new(config.command_timeout(), config.max_retries),
            workdir: config.workdir.clone(),
        }
    }

    /// Runs the agent with the given prompt and returns the final
    /// execution result, whether from the first attempt or the retry.
    pub async fn run<R: ContainerRuntime>(
        &self,
        sandbox: &Sandbox<R>,
        prompt: &str,
    ) -> Result<ExecOutput, SandboxError> {
        info!("Executing codex: {}", truncate(prompt, 100));

        let command = format!("codex exec \"{}\" --yolo", escape_prompt(prompt));
        let request = ExecRequest::shell(command).with_workdir(&self.workdir);

        self.runner.run(sandbox, &request).await
    }
}

/// Escapes a prompt for safe interpolation inside double quotes.
fn escape_prompt(prompt: &str) -> String {
    prompt
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
}

/// Shortens a log line to at most `max` bytes, cutting on a char
/// boundary so multibyte prompts never split mid-character.
fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
