//! Runtime client adapter for the host container runtime.
//!
//! The sandbox core depends on this thin interface rather than on the
//! Docker API directly, so tests can inject an in-memory runtime with
//! an isolated name-keyed container registry per test case.

mod docker;
#[cfg(test)]
mod fake;

pub(crate) use docker::{DockerRuntime, WORKSPACE_MOUNT};
#[cfg(test)]
pub(crate) use fake::FakeRuntime;

use async_trait::async_trait;

use crate::sandbox::{ExecOutput, ExecRequest, SandboxError};

/// Observed container state, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContainerStatus {
    Created,
    Running,
    Stopped,
    /// Any other runtime state (paused, restarting, dead, ...).
    Other(String),
}

impl ContainerStatus {
    pub(crate) fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "exited"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A container located by name lookup.
#[derive(Debug, Clone)]
pub(crate) struct FoundContainer {
    pub id: String,
    pub status: ContainerStatus,
}

/// Parameters for creating a fresh sandbox container.
#[derive(Debug, Clone)]
pub(crate) struct CreateSpec {
    pub image: String,
    pub name: String,
    pub working_dir: String,
}

/// Operations the sandbox core requires from the host container runtime.
#[async_trait]
pub(crate) trait ContainerRuntime: Send + Sync {
    /// Looks up a container by name. Returns `None` if no container
    /// with that name exists.
    async fn find_container(&self, name: &str) -> Result<Option<FoundContainer>, SandboxError>;

    /// Creates a container from the spec and returns its id. Does not
    /// start it.
    async fn create_container(&self, spec: &CreateSpec) -> Result<String, SandboxError>;

    async fn start_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Stops a container. Stopping an already-stopped or missing
    /// container is a no-op, not an error.
    async fn stop_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Force-removes a container. Removing a missing container is a
    /// no-op, not an error.
    async fn remove_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Runs a command inside a running container, blocking until the
    /// remote process exits. Captures stdout and stderr separately.
    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, SandboxError>;

    /// Writes `data` as `remote_dir/file_name` inside the container.
    async fn copy_into(
        &self,
        id: &str,
        data: &[u8],
        remote_dir: &str,
        file_name: &str,
    ) -> Result<(), SandboxError>;
}
