//! Reusable Docker sandbox: lifecycle, command execution, stuck-process
//! reaping, and the timeout-aware task runner that composes them.

mod error;
mod exec;
mod lifecycle;
mod reaper;
mod runner;

pub(crate) use error::SandboxError;
pub(crate) use exec::{ExecOutput, ExecRequest};
pub(crate) use lifecycle::{Sandbox, SandboxSpec};
pub(crate) use runner::TaskRunner;
