//! In-memory container runtime for tests.
//!
//! Each instance is an isolated name-keyed registry, so tests never
//! share sandbox state. Exec behavior is scripted with rules matched
//! by substring against the joined command line; unmatched commands
//! succeed with empty output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContainerRuntime, ContainerStatus, CreateSpec, FoundContainer};
use crate::sandbox::{ExecOutput, ExecRequest, SandboxError};

#[derive(Debug, Clone)]
struct ExecRule {
    pattern: String,
    exit_code: i64,
    stdout: String,
    stderr: String,
    delay: Option<Duration>,
    error: Option<String>,
    /// How many more times this rule may fire; `None` = unlimited.
    remaining: Option<u32>,
}

/// Scriptable in-memory runtime.
pub(crate) struct FakeRuntime {
    containers: Mutex<HashMap<String, FoundContainer>>,
    rules: Mutex<Vec<ExecRule>>,
    requests: Mutex<Vec<ExecRequest>>,
    copied: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            copied: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_id(&self) -> String {
        format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Seeds a pre-existing container in the given status.
    pub fn seed_with_status(&self, name: &str, status: ContainerStatus) -> String {
        let id = self.alloc_id();
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FoundContainer {
                id: id.clone(),
                status,
            },
        );
        id
    }

    pub fn seed_running(&self, name: &str) -> String {
        self.seed_with_status(name, ContainerStatus::Running)
    }

    pub fn seed_stopped(&self, name: &str) -> String {
        self.seed_with_status(name, ContainerStatus::Stopped)
    }

    /// Forces a container's status, as if it changed behind the
    /// sandbox's back.
    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(container) = self.containers.lock().unwrap().get_mut(name) {
            container.status = status;
        }
    }

    pub fn container_status(&self, name: &str) -> Option<ContainerStatus> {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.status.clone())
    }

    fn push_rule(&self, rule: ExecRule) {
        self.rules.lock().unwrap().push(rule);
    }

    /// Commands containing `pattern` return this canned output.
    pub fn respond(&self, pattern: &str, exit_code: i64, stdout: &str, stderr: &str) {
        self.push_rule(ExecRule {
            pattern: pattern.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            delay: None,
            error: None,
            remaining: None,
        });
    }

    /// Commands containing `pattern` sleep for `delay` before
    /// completing, simulating a hung process.
    pub fn hang(&self, pattern: &str, delay: Duration) {
        self.push_rule(ExecRule {
            pattern: pattern.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay: Some(delay),
            error: None,
            remaining: None,
        });
    }

    /// Like `hang`, but only for the first matching command.
    pub fn hang_once(&self, pattern: &str, delay: Duration) {
        self.push_rule(ExecRule {
            pattern: pattern.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay: Some(delay),
            error: None,
            remaining: Some(1),
        });
    }

    /// Commands containing `pattern` fail with a runtime error.
    pub fn fail(&self, pattern: &str, message: &str) {
        self.push_rule(ExecRule {
            pattern: pattern.to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            delay: None,
            error: Some(message.to_string()),
            remaining: None,
        });
    }

    /// Every exec request received, in order.
    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Joined command lines of every exec request, in order.
    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.cmd.join(" "))
            .collect()
    }

    /// Remote paths of every file copied into a container.
    pub fn copied_files(&self) -> Vec<String> {
        self.copied.lock().unwrap().clone()
    }

    fn take_matching_rule(&self, command: &str) -> Option<ExecRule> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| command.contains(&r.pattern) && r.remaining != Some(0))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.clone())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn find_container(&self, name: &str) -> Result<Option<FoundContainer>, SandboxError> {
        Ok(self.containers.lock().unwrap().get(name).cloned())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<String, SandboxError> {
        let id = self.alloc_id();
        self.containers.lock().unwrap().insert(
            spec.name.clone(),
            FoundContainer {
                id: id.clone(),
                status: ContainerStatus::Created,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.values_mut().find(|c| c.id == id) {
            Some(container) => {
                container.status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(SandboxError::execution(format!("no such container: {id}"))),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), SandboxError> {
        let mut containers = self.containers.lock().unwrap();
        if let Some(container) = containers.values_mut().find(|c| c.id == id) {
            container.status = ContainerStatus::Stopped;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        self.containers
            .lock()
            .unwrap()
            .retain(|_, container| container.id != id);
        Ok(())
    }

    async fn exec(&self, _id: &str, request: &ExecRequest) -> Result<ExecOutput, SandboxError> {
        self.requests.lock().unwrap().push(request.clone());

        let command = request.cmd.join(" ");
        let Some(rule) = self.take_matching_rule(&command) else {
            return Ok(ExecOutput::new(0, "", ""));
        };

        if let Some(delay) = rule.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = rule.error {
            return Err(SandboxError::execution(message));
        }
        Ok(ExecOutput::new(rule.exit_code, rule.stdout, rule.stderr))
    }

    async fn copy_into(
        &self,
        _id: &str,
        _data: &[u8],
        remote_dir: &str,
        file_name: &str,
    ) -> Result<(), SandboxError> {
        self.copied
            .lock()
            .unwrap()
            .push(format!("{remote_dir}/{file_name}"));
        Ok(())
    }
}
