//! Best-effort termination of stuck processes inside a sandbox.
//!
//! Remote execution has no cancel primitive at the runtime boundary,
//! so the only way to unblock a hung call is an out-of-band kill of
//! the offending processes. The sweep is catalog-driven and coarse on
//! purpose: the sandbox is disposable, reusable state, not a
//! multi-tenant resource, so reliability beats precision.

use tracing::{info, warn};

use super::exec::ExecRequest;
use super::lifecycle::Sandbox;
use crate::runtime::ContainerRuntime;

/// One entry in the stuck-process catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum KillTarget {
    /// Processes whose command line matches this pattern.
    Process { pattern: &'static str },
    /// Whatever process is currently bound to this TCP port.
    Port { port: u16 },
}

impl KillTarget {
    /// Renders the in-sandbox kill command for this target. Each
    /// command is self-tolerant (`|| true`): a missed match must not
    /// fail the sweep.
    pub fn kill_command(&self) -> String {
        match self {
            Self::Process { pattern } => format!("pkill -f '{pattern}' || true"),
            Self::Port { port } => format!("fuser -k {port}/tcp 2>/dev/null || true"),
        }
    }
}

/// Known runaway process signatures and the ports dev servers squat on.
pub(crate) const DEFAULT_TARGETS: &[KillTarget] = &[
    KillTarget::Process { pattern: "bun dev" },
    KillTarget::Process { pattern: "npm run" },
    KillTarget::Process {
        pattern: "node.*server",
    },
    KillTarget::Process {
        pattern: "python.*-m.*http",
    },
    KillTarget::Process {
        pattern: "flask run",
    },
    KillTarget::Process { pattern: "uvicorn" },
    KillTarget::Process {
        pattern: "gunicorn",
    },
    KillTarget::Port { port: 3000 },
    KillTarget::Port { port: 5000 },
    KillTarget::Port { port: 8000 },
    KillTarget::Port { port: 8080 },
];

/// Sweeps the catalog, killing every matching process and freeing
/// every reserved port. Per-target failures are logged and skipped;
/// the sweep always attempts every remaining target and never raises.
pub(crate) async fn reap<R: ContainerRuntime>(sandbox: &Sandbox<R>, targets: &[KillTarget]) {
    info!("Reaping stuck processes in sandbox {}", sandbox.name());
    for target in targets {
        if let Err(err) = sandbox
            .execute(ExecRequest::shell(target.kill_command()))
            .await
        {
            warn!("Reap target {target:?} failed, skipping: {err}");
        }
    }
}
