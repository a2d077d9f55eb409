//! Sandbox lifecycle management: reuse-or-create, provisioning,
//! stop/remove, and scoped acquisition.
//!
//! One `name` maps to at most one container; the name is the reuse key.
//! The lifecycle manager is the sole owner of create/stop/remove
//! transitions. Concurrent callers sharing one name are unsupported by
//! contract: serialize, or use distinct names.

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::error::SandboxError;
use super::exec::ExecRequest;
use crate::runtime::{ContainerRuntime, ContainerStatus, CreateSpec};
use crate::templates;

/// Identity of one sandbox: the image it runs, its reuse key, and its
/// default working directory.
#[derive(Debug, Clone)]
pub(crate) struct SandboxSpec {
    pub image: String,
    pub name: String,
    pub working_dir: String,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            image: "ubuntu:24.04".to_string(),
            name: "swea".to_string(),
            working_dir: "/root".to_string(),
        }
    }
}

/// Lifecycle state of the sandbox container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SandboxState {
    Created,
    Running,
    Stopped,
}

/// An addressable sandbox: runtime-assigned id plus lifecycle state.
/// Created by `start`, mutated only by lifecycle transitions, and
/// invalidated by `remove`.
#[derive(Debug, Clone)]
pub(crate) struct SandboxHandle {
    pub id: String,
    pub state: SandboxState,
    pub was_reused: bool,
}

/// Provisioning steps run exactly once on a freshly created sandbox,
/// in order. Each step must exit zero or the sandbox is torn down.
const PROVISION_STEPS: &[(&str, &str)] = &[
    (
        "install-base-packages",
        "apt-get update && apt-get install -y curl ca-certificates gnupg git python3 python3-pip python3-venv",
    ),
    (
        "install-node",
        "curl -fsSL https://deb.nodesource.com/setup_22.x | bash - && apt-get install -y nodejs",
    ),
    ("install-codex", "npm install -g @openai/codex"),
    ("install-uv", "curl -LsSf https://astral.sh/uv/install.sh | sh"),
    (
        "clone-vibetest",
        "cd /root && git clone https://github.com/browser-use/vibetest-use.git",
    ),
    (
        "setup-vibetest-venv",
        "cd /root/vibetest-use && /root/.local/bin/uv venv && . .venv/bin/activate && /root/.local/bin/uv pip install -e .",
    ),
    (
        "install-playwright",
        "cd /root/vibetest-use && . .venv/bin/activate && playwright install chromium --with-deps",
    ),
];

/// A managed, reusable sandbox container.
pub(crate) struct Sandbox<R: ContainerRuntime> {
    runtime: R,
    spec: SandboxSpec,
    api_key: Option<String>,
    handle: Option<SandboxHandle>,
}

impl<R: ContainerRuntime> Sandbox<R> {
    pub fn new(runtime: R, spec: SandboxSpec) -> Self {
        Self {
            runtime,
            spec,
            api_key: None,
            handle: None,
        }
    }

    /// Sets the API key rendered into the in-sandbox agent config.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub(crate) fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn working_dir(&self) -> &str {
        &self.spec.working_dir
    }

    pub fn handle(&self) -> Option<&SandboxHandle> {
        self.handle.as_ref()
    }

    /// True when `start` found an existing sandbox instead of creating
    /// a fresh one.
    pub fn was_reused(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.was_reused)
    }

    /// Brings the sandbox to `running`.
    ///
    /// Reuses an existing container with the same name when one exists
    /// (starting it first if stopped); otherwise creates a fresh one
    /// and provisions it. A provisioning failure removes the fresh
    /// container before the error propagates, so no half-provisioned
    /// sandbox is left running.
    pub async fn start(&mut self) -> Result<(), SandboxError> {
        if let Some(found) = self.runtime.find_container(&self.spec.name).await? {
            match found.status {
                ContainerStatus::Running => {
                    info!("Reusing existing running container {}", self.spec.name);
                    self.handle = Some(SandboxHandle {
                        id: found.id,
                        state: SandboxState::Running,
                        was_reused: true,
                    });
                    return Ok(());
                }
                ContainerStatus::Stopped => {
                    info!("Starting existing stopped container {}", self.spec.name);
                    self.runtime.start_container(&found.id).await?;
                    self.handle = Some(SandboxHandle {
                        id: found.id,
                        state: SandboxState::Running,
                        was_reused: true,
                    });
                    return Ok(());
                }
                other => {
                    info!(
                        "Removing container {} in state {other}",
                        self.spec.name
                    );
                    self.runtime.remove_container(&found.id).await?;
                }
            }
        }

        let create_spec = CreateSpec {
            image: self.spec.image.clone(),
            name: self.spec.name.clone(),
            working_dir: self.spec.working_dir.clone(),
        };
        let id = self.runtime.create_container(&create_spec).await?;
        self.handle = Some(SandboxHandle {
            id: id.clone(),
            state: SandboxState::Created,
            was_reused: false,
        });

        self.runtime.start_container(&id).await?;
        if let Some(handle) = self.handle.as_mut() {
            handle.state = SandboxState::Running;
        }
        info!("Container {} started with id {id}", self.spec.name);

        if let Err(err) = self.provision().await {
            warn!("Provisioning failed, removing container {}: {err}", self.spec.name);
            if let Err(remove_err) = self.runtime.remove_container(&id).await {
                warn!("Failed to remove half-provisioned container: {remove_err}");
            }
            self.handle = None;
            return Err(err);
        }

        Ok(())
    }

    /// Runs the one-time setup sequence on a fresh sandbox.
    async fn provision(&self) -> Result<(), SandboxError> {
        for (step, command) in PROVISION_STEPS {
            self.provision_step(step, command).await?;
        }

        let version = self.execute(ExecRequest::shell("codex --version")).await?;
        info!("Codex CLI installed: {}", version.stdout.trim());

        // PATH for uv-installed tools; failure here is not fatal.
        let _ = self
            .execute(ExecRequest::shell(
                "echo 'export PATH=\"/root/.local/bin:$PATH\"' >> /root/.bashrc",
            ))
            .await;

        self.setup_workspace().await?;
        self.sync_config().await?;
        self.sync_agents().await?;

        Ok(())
    }

    async fn provision_step(&self, step: &str, command: &str) -> Result<(), SandboxError> {
        info!("Provisioning: {step}...");
        let output = self.execute(ExecRequest::shell(command)).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SandboxError::provisioning(step, output.stderr))
        }
    }

    async fn setup_workspace(&self) -> Result<(), SandboxError> {
        debug!("Setting up workspace with git repo...");
        self.provision_step(
            "setup-workspace",
            &format!(
                "mkdir -p {workspace} && cd {workspace} && git init 2>/dev/null || true",
                workspace = crate::runtime::WORKSPACE_MOUNT
            ),
        )
        .await?;
        self.provision_step(
            "configure-git",
            &format!(
                "cd {} && git config user.email 'swea@local' && git config user.name 'SWEA'",
                crate::runtime::WORKSPACE_MOUNT
            ),
        )
        .await
    }

    /// Renders and copies the agent CLI config into the sandbox. The
    /// API key is required here: a missing key is a configuration
    /// error, not a silent degradation. The key itself is never logged.
    async fn sync_config(&self) -> Result<(), SandboxError> {
        debug!("Syncing agent CLI config...");
        self.provision_step("create-config-dir", "mkdir -p /root/.codex")
            .await?;

        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SandboxError::provisioning(
                    "sync-config",
                    "GOOGLE_API_KEY is not set; export it or add it to .env",
                )
            })?;

        let rendered = templates::CODEX_CONFIG.replace("${GOOGLE_API_KEY}", api_key);
        self.copy_into(rendered.as_bytes(), "/root/.codex", "config.toml")
            .await
    }

    async fn sync_agents(&self) -> Result<(), SandboxError> {
        debug!("Syncing AGENTS.md...");
        self.copy_into(
            templates::AGENTS_MD.as_bytes(),
            crate::runtime::WORKSPACE_MOUNT,
            "AGENTS.md",
        )
        .await
    }

    pub(crate) async fn copy_into(
        &self,
        data: &[u8],
        remote_dir: &str,
        file_name: &str,
    ) -> Result<(), SandboxError> {
        let Some(handle) = &self.handle else {
            return Err(SandboxError::not_running("absent"));
        };
        self.runtime
            .copy_into(&handle.id, data, remote_dir, file_name)
            .await
    }

    /// Re-copies configuration into a running sandbox without
    /// recreating it. Fails with `NotRunning` otherwise.
    pub async fn reinitialize(&mut self) -> Result<(), SandboxError> {
        match self.runtime.find_container(&self.spec.name).await? {
            Some(found) if found.status.is_running() => {
                if self.handle.is_none() {
                    self.handle = Some(SandboxHandle {
                        id: found.id,
                        state: SandboxState::Running,
                        was_reused: true,
                    });
                }
            }
            Some(found) => return Err(SandboxError::not_running(found.status.to_string())),
            None => return Err(SandboxError::not_running("absent")),
        }

        info!("Re-initializing container configuration...");
        self.setup_workspace().await?;
        self.sync_config().await?;
        self.sync_agents().await?;
        info!("Container re-initialized successfully");
        Ok(())
    }

    /// Stops the sandbox without removing it. Idempotent: stopping an
    /// already-stopped or absent sandbox is a no-op.
    pub async fn stop(&mut self) -> Result<(), SandboxError> {
        let Some(handle) = self.handle.as_mut() else {
            debug!("No sandbox to stop");
            return Ok(());
        };
        if handle.state != SandboxState::Running {
            debug!("Sandbox already stopped");
            return Ok(());
        }

        info!("Stopping container {}...", self.spec.name);
        self.runtime.stop_container(&handle.id).await?;
        handle.state = SandboxState::Stopped;
        Ok(())
    }

    /// Stops then removes the sandbox, invalidating the handle.
    /// Idempotent under the same rule as `stop`. Falls back to a name
    /// lookup when no handle is held, so a sandbox left over from a
    /// previous run can be torn down too.
    pub async fn remove(&mut self) -> Result<(), SandboxError> {
        let id = match self.handle.take() {
            Some(handle) => Some(handle.id),
            None => self
                .runtime
                .find_container(&self.spec.name)
                .await?
                .map(|found| found.id),
        };
        let Some(id) = id else {
            debug!("No sandbox to remove");
            return Ok(());
        };

        self.runtime.stop_container(&id).await?;
        info!("Removing container {}...", self.spec.name);
        self.runtime.remove_container(&id).await?;
        Ok(())
    }

    /// Scoped acquisition: starts the sandbox, runs the closure, and
    /// guarantees `stop` (not `remove`) on every exit path so the
    /// container persists for later reuse.
    pub async fn run_scoped<T, F>(&mut self, f: F) -> Result<T, SandboxError>
    where
        F: for<'a> FnOnce(&'a mut Sandbox<R>) -> BoxFuture<'a, Result<T, SandboxError>>,
    {
        self.start().await?;
        let result = f(self).await;
        if let Err(err) = self.stop().await {
            warn!("Failed to stop sandbox on scope exit: {err}");
        }
        result
    }
}
