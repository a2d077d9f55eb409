//! Command execution inside a running sandbox.
//!
//! The executor layer has no timeout of its own: `execute` blocks until
//! the remote process exits or the runtime call fails. Timeout and
//! retry policy live in [`super::runner::TaskRunner`], layered on top.

use std::collections::HashMap;

use tracing::debug;

use super::error::SandboxError;
use super::lifecycle::Sandbox;
use crate::runtime::ContainerRuntime;

/// A single command to run inside the sandbox. Immutable once built.
#[derive(Debug, Clone)]
pub(crate) struct ExecRequest {
    /// Argv to execute.
    pub cmd: Vec<String>,
    /// Working directory; defaults to the sandbox's configured one.
    pub workdir: Option<String>,
    /// Extra environment variables for this command only.
    pub env: Option<HashMap<String, String>>,
    /// User to run as; defaults to the sandbox's privileged user.
    pub user: Option<String>,
}

impl ExecRequest {
    /// Wraps a shell command string as `/bin/bash -c <command>`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            cmd: vec!["/bin/bash".to_string(), "-c".to_string(), command.into()],
            workdir: None,
            env: None,
            user: None,
        }
    }

    /// Builds a request from an explicit argv.
    #[allow(dead_code)] // Public API for callers
    pub fn argv(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            workdir: None,
            env: None,
            user: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    #[allow(dead_code)] // Public API for callers
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Fills in the sandbox defaults for fields the caller left unset.
    fn with_defaults(mut self, working_dir: &str) -> Self {
        if self.workdir.is_none() {
            self.workdir = Some(working_dir.to_string());
        }
        if self.user.is_none() {
            self.user = Some("root".to_string());
        }
        self
    }
}

/// The outcome of one executed command. Non-zero exit codes are data,
/// not errors.
#[derive(Debug, Clone)]
pub(crate) struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Explicit opt-in to treat a non-zero exit as an error.
    #[allow(dead_code)] // Public API for callers
    pub fn into_result(self) -> Result<Self, SandboxError> {
        if self.success() {
            Ok(self)
        } else {
            Err(SandboxError::CommandFailed {
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

impl<R: ContainerRuntime> Sandbox<R> {
    /// Runs a command inside the sandbox and blocks until it exits.
    ///
    /// Fails with `NotRunning` if the container is not currently
    /// running; never starts it implicitly. The live container state is
    /// re-queried on every call rather than trusted from the handle.
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecOutput, SandboxError> {
        let Some(handle) = self.handle() else {
            return Err(SandboxError::not_running("absent"));
        };

        match self.runtime().find_container(self.name()).await? {
            Some(found) if found.status.is_running() => {}
            Some(found) => return Err(SandboxError::not_running(found.status.to_string())),
            None => return Err(SandboxError::not_running("absent")),
        }

        let request = request.with_defaults(self.working_dir());
        debug!("Executing command: {:?}", request.cmd);

        self.runtime().exec(&handle.id, &request).await
    }

    /// Writes `script` to a temporary path inside the sandbox and runs
    /// it with `interpreter` (default `/bin/bash`) as a single logical
    /// unit with one exit code.
    pub async fn execute_script(
        &self,
        script: &str,
        interpreter: Option<&str>,
        workdir: Option<&str>,
        env: Option<HashMap<String, String>>,
    ) -> Result<ExecOutput, SandboxError> {
        let interpreter = interpreter.unwrap_or("/bin/bash");
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let script_path = format!("/tmp/script_{}.sh", &tag[..8]);

        let create = self
            .execute(ExecRequest::shell(format!(
                "cat > {script_path} << 'SCRIPT_EOF'\n{script}\nSCRIPT_EOF"
            )))
            .await?;
        if !create.success() {
            return Ok(create);
        }

        let chmod = self
            .execute(ExecRequest::shell(format!("chmod +x {script_path}")))
            .await?;
        if !chmod.success() {
            return Ok(chmod);
        }

        let mut run = ExecRequest::shell(format!("{interpreter} {script_path}"));
        if let Some(workdir) = workdir {
            run = run.with_workdir(workdir);
        }
        if let Some(env) = env {
            run = run.with_env(env);
        }
        let result = self.execute(run).await?;

        // Best-effort cleanup of the temp script.
        let _ = self
            .execute(ExecRequest::shell(format!("rm -f {script_path}")))
            .await;

        Ok(result)
    }
}
