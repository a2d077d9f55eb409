//! Docker implementation of the container runtime adapter.
//!
//! Talks to the local Docker daemon over its default socket via
//! bollard. Sandbox containers are created with host networking, an
//! `unless-stopped` restart policy, and a named volume mounted at the
//! workspace path so workspace state survives remove/recreate cycles.

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, RemoveContainerOptions,
    StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::{ContainerRuntime, ContainerStatus, CreateSpec, FoundContainer};
use crate::sandbox::{ExecOutput, ExecRequest, SandboxError};

/// Path inside the sandbox where the persistent workspace volume is
/// mounted.
pub(crate) const WORKSPACE_MOUNT: &str = "/root/workspace";

/// Container runtime backed by the local Docker daemon.
pub(crate) struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and verifies it responds.
    pub async fn connect() -> Result<Self, SandboxError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::docker_unavailable(e.to_string()))?;

        client
            .ping()
            .await
            .map_err(|e| SandboxError::docker_unavailable(format!("cannot ping daemon: {e}")))?;

        Ok(Self { client })
    }

    /// Pulls the image if it is not present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        match self.client.inspect_image(image).await {
            Ok(_) => {
                debug!("Image {image} already exists locally");
                return Ok(());
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(SandboxError::execution(e.to_string())),
        }

        info!("Pulling image {image}...");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress.map_err(|e| {
                SandboxError::execution(format!("failed to pull image {image}: {e}"))
            })?;
            if let Some(error) = info.error {
                return Err(SandboxError::execution(format!(
                    "failed to pull image {image}: {error}"
                )));
            }
        }

        info!("Successfully pulled {image}");
        Ok(())
    }
}

fn map_status(status: Option<ContainerStateStatusEnum>) -> ContainerStatus {
    match status {
        Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
        Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
        Some(ContainerStateStatusEnum::EXITED) => ContainerStatus::Stopped,
        Some(other) => ContainerStatus::Other(other.to_string()),
        None => ContainerStatus::Other("unknown".to_string()),
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_container(&self, name: &str) -> Result<Option<FoundContainer>, SandboxError> {
        match self.client.inspect_container(name, None).await {
            Ok(inspect) => {
                let id = inspect
                    .id
                    .ok_or_else(|| SandboxError::execution("container inspect returned no id"))?;
                let status = map_status(inspect.state.and_then(|s| s.status));
                Ok(Some(FoundContainer { id, status }))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(SandboxError::execution(e.to_string())),
        }
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, SandboxError> {
        self.ensure_image(&spec.image).await?;

        info!("Creating container {} from {}...", spec.name, spec.image);

        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.working_dir.clone()),
            user: Some("root".to_string()),
            // Keep an interactive shell alive so the container stays up
            // between exec calls.
            cmd: Some(vec!["/bin/bash".to_string()]),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}-data:{WORKSPACE_MOUNT}", spec.name)]),
                network_mode: Some("host".to_string()),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| SandboxError::execution(format!("failed to create container: {e}")))?;

        debug!("Created container {} with id {}", spec.name, container.id);
        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.client
            .start_container::<String>(id, None)
            .await
            .map_err(|e| SandboxError::execution(format!("failed to start container: {e}")))
    }

    async fn stop_container(&self, id: &str) -> Result<(), SandboxError> {
        match self
            .client
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped; 404: already gone. Both fine.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => Ok(()),
            Err(e) => Err(SandboxError::execution(format!(
                "failed to stop container: {e}"
            ))),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        match self
            .client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(SandboxError::execution(format!(
                "failed to remove container: {e}"
            ))),
        }
    }

    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, SandboxError> {
        let env: Option<Vec<String>> = request
            .env
            .as_ref()
            .map(|vars| vars.iter().map(|(k, v)| format!("{k}={v}")).collect());

        let exec = self
            .client
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(request.cmd.clone()),
                    working_dir: request.workdir.clone(),
                    env,
                    user: request.user.clone(),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::execution(format!("failed to create exec: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match self
            .client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::execution(format!("failed to start exec: {e}")))?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                        Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                        Ok(LogOutput::Console { message }) => stdout.extend_from_slice(&message),
                        Ok(_) => {}
                        Err(e) => {
                            return Err(SandboxError::execution(format!(
                                "error reading exec output: {e}"
                            )))
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::execution("exec was detached unexpectedly"));
            }
        }

        let inspect = self
            .client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::execution(format!("failed to inspect exec: {e}")))?;

        Ok(ExecOutput::new(
            inspect.exit_code.unwrap_or(0),
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    async fn copy_into(
        &self,
        id: &str,
        data: &[u8],
        remote_dir: &str,
        file_name: &str,
    ) -> Result<(), SandboxError> {
        debug!("Copying {file_name} into container at {remote_dir}");

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, file_name, data)
            .map_err(|e| SandboxError::execution(format!("failed to build tar archive: {e}")))?;
        let archive = builder
            .into_inner()
            .map_err(|e| SandboxError::execution(format!("failed to finish tar archive: {e}")))?;

        let options = UploadToContainerOptions {
            path: remote_dir.to_string(),
            ..Default::default()
        };

        let body = bytes::Bytes::from(archive);
        self.client
            .upload_to_container(id, Some(options), body.into())
            .await
            .map_err(|e| SandboxError::execution(format!("failed to copy into container: {e}")))
    }
}
