//! Domain-specific error types for sandbox operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings. Note that a non-zero
//! exit code is *not* an error: it is data on [`crate::sandbox::ExecOutput`],
//! and only the explicit `into_result` opt-in turns it into
//! [`SandboxError::CommandFailed`].

use std::time::Duration;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    DockerUnavailable { message: String },

    /// A fresh-sandbox provisioning step exited non-zero.
    #[error("Provisioning step '{step}' failed: {message}")]
    Provisioning { step: String, message: String },

    /// An operation requiring a running sandbox was invoked on one that
    /// is not running.
    #[error("Sandbox is not running (status: {status})")]
    NotRunning { status: String },

    /// A command-level wait exceeded the configured timeout. The remote
    /// process may still be running and must be reaped.
    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The container runtime itself failed to complete a call
    /// (transport or runtime failure, not a non-zero exit code).
    #[error("Container runtime call failed: {message}")]
    Execution { message: String },

    /// A command exited non-zero and the caller opted in to treating
    /// that as an error via `ExecOutput::into_result`.
    #[error("Command failed with exit code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i64, stderr: String },
}

impl SandboxError {
    /// Creates a `DockerUnavailable` error.
    pub fn docker_unavailable(message: impl Into<String>) -> Self {
        Self::DockerUnavailable {
            message: message.into(),
        }
    }

    /// Creates a `Provisioning` error for a named setup step.
    pub fn provisioning(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Creates a `NotRunning` error from the observed container status.
    pub fn not_running(status: impl Into<String>) -> Self {
        Self::NotRunning {
            status: status.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates an `Execution` error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Returns true if this is a timeout error.
    #[allow(dead_code)] // Public API for callers
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is a not-running error.
    #[allow(dead_code)] // Public API for callers
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning { .. })
    }

    /// Returns true if this is a provisioning error.
    #[allow(dead_code)] // Public API for callers
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Provisioning { .. })
    }
}
