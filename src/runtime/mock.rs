// ABOUTME: In-memory runtime client for tests.
// ABOUTME: Scripted staleness verdicts, fault injection, and an operation log.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::container::{Container, ContainerState};
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::{
    ContainerError, ContainerOps, CreateSpec, ExecError, ExecOps, ExecOutcome, ImageError,
    ImageOps, Staleness,
};
use crate::types::{ContainerId, ImageId};

/// Fixed timestamps keep mock containers deterministic.
fn mock_time(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Scripted answer for `is_stale`.
#[derive(Debug, Clone)]
pub enum StaleScript {
    Fresh,
    Stale(ImageId),
    PullError(String),
}

/// One recorded client operation, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Stop(String),
    StopAndRemove(String),
    Rename(String, String),
    Create(String),
    Start(String),
    WaitHealthy(String),
    RemoveImage(String),
    Exec(String, String),
    StaleCheck(String),
}

#[derive(Default)]
struct MockState {
    containers: Vec<Container>,
    stale: HashMap<String, StaleScript>,
    exec_codes: HashMap<String, i64>,
    fail_stop: HashMap<String, String>,
    fail_create: HashMap<String, String>,
    fail_start: HashMap<String, String>,
    fail_health: HashMap<String, String>,
    // Remaining removal failures per container name, consumed per attempt.
    fail_remove_counts: HashMap<String, u32>,
    remove_image_errors: HashMap<String, RemoveImageScript>,
    ops: Vec<Op>,
    next_id: u64,
}

#[derive(Debug, Clone)]
enum RemoveImageScript {
    NotFound,
    InUse,
    Other(String),
}

/// In-memory client double used by the unit and integration tests.
#[derive(Default)]
pub struct MockClient {
    state: Mutex<MockState>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, container: Container) {
        self.state.lock().containers.push(container);
    }

    /// Script the staleness verdict for a container name.
    pub fn script_stale(&self, name: &str, script: StaleScript) {
        self.state.lock().stale.insert(name.to_string(), script);
    }

    /// Script the exit code returned for a hook command.
    pub fn script_exec(&self, command: &str, exit_code: i64) {
        self.state
            .lock()
            .exec_codes
            .insert(command.to_string(), exit_code);
    }

    pub fn fail_stop(&self, name: &str, message: &str) {
        self.state
            .lock()
            .fail_stop
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_create(&self, name: &str, message: &str) {
        self.state
            .lock()
            .fail_create
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_start(&self, name: &str, message: &str) {
        self.state
            .lock()
            .fail_start
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_health(&self, name: &str, message: &str) {
        self.state
            .lock()
            .fail_health
            .insert(name.to_string(), message.to_string());
    }

    /// Make the next `attempts` removals of `name` fail.
    pub fn fail_removals(&self, name: &str, attempts: u32) {
        self.state
            .lock()
            .fail_remove_counts
            .insert(name.to_string(), attempts);
    }

    pub fn fail_remove_image_not_found(&self, image_id: &str) {
        self.state
            .lock()
            .remove_image_errors
            .insert(image_id.to_string(), RemoveImageScript::NotFound);
    }

    pub fn fail_remove_image_in_use(&self, image_id: &str) {
        self.state
            .lock()
            .remove_image_errors
            .insert(image_id.to_string(), RemoveImageScript::InUse);
    }

    pub fn fail_remove_image(&self, image_id: &str, message: &str) {
        self.state
            .lock()
            .remove_image_errors
            .insert(image_id.to_string(), RemoveImageScript::Other(message.to_string()));
    }

    /// Every operation performed so far, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().ops.clone()
    }

    /// Current containers, in insertion order.
    pub fn containers(&self) -> Vec<Container> {
        self.state.lock().containers.clone()
    }

    pub fn container_named(&self, name: &str) -> Option<Container> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    fn record(&self, op: Op) {
        self.state.lock().ops.push(op);
    }

    fn name_of(&self, id: &ContainerId) -> Option<String> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.name.clone())
    }
}

/// Fluent builder for mock containers.
pub struct ContainerBuilder {
    name: String,
    id: Option<ContainerId>,
    image_id: ImageId,
    image_ref: String,
    created: DateTime<Utc>,
    state: ContainerState,
    links: Vec<String>,
    network_mode: Option<String>,
    labels: HashMap<String, String>,
}

impl ContainerBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            image_id: ImageId::new(format!("sha256:img-{name}")),
            image_ref: format!("{name}:latest"),
            created: mock_time(1_700_000_000),
            state: ContainerState::Running,
            links: Vec::new(),
            network_mode: None,
            labels: HashMap::new(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(ContainerId::new(id));
        self
    }

    pub fn image_id(mut self, id: &str) -> Self {
        self.image_id = ImageId::new(id);
        self
    }

    pub fn image_ref(mut self, reference: &str) -> Self {
        self.image_ref = reference.to_string();
        self
    }

    pub fn created_at(mut self, unix: i64) -> Self {
        self.created = mock_time(unix);
        self
    }

    pub fn stopped(mut self) -> Self {
        self.state = ContainerState::Stopped;
        self
    }

    pub fn restarting(mut self) -> Self {
        self.state = ContainerState::Restarting;
        self
    }

    pub fn link(mut self, target: &str) -> Self {
        self.links.push(target.to_string());
        self
    }

    pub fn network_mode(mut self, mode: &str) -> Self {
        self.network_mode = Some(mode.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Container {
        let id = self
            .id
            .unwrap_or_else(|| ContainerId::new(format!("id-{}", self.name)));
        let spec = CreateSpec {
            name: self.name.clone(),
            image: self.image_ref.clone(),
            labels: self.labels.clone(),
            network_mode: self.network_mode.clone(),
            ..Default::default()
        };
        Container {
            id,
            name: self.name,
            image_id: self.image_id,
            image_ref: self.image_ref,
            created: self.created,
            state: self.state,
            links: self.links,
            network_mode: self.network_mode,
            labels: self.labels,
            spec,
        }
    }
}

impl Sealed for MockClient {}

#[async_trait]
impl ContainerOps for MockClient {
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<Container>, ContainerError> {
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| include_stopped || c.state == ContainerState::Running)
            .cloned()
            .collect())
    }

    async fn get_container(&self, id: &ContainerId) -> Result<Container, ContainerError> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| &c.id == id)
            .cloned()
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        let name = self
            .name_of(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        self.record(Op::Stop(name.clone()));

        let mut state = self.state.lock();
        if let Some(message) = state.fail_stop.get(&name) {
            return Err(ContainerError::Runtime(message.clone()));
        }
        if let Some(c) = state.containers.iter_mut().find(|c| &c.id == id) {
            c.state = ContainerState::Stopped;
        }
        Ok(())
    }

    async fn stop_and_remove(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        let Some(name) = self.name_of(id) else {
            // Idempotent: a missing container is already removed.
            self.record(Op::StopAndRemove(id.to_string()));
            return Ok(());
        };
        self.record(Op::StopAndRemove(name.clone()));

        let mut state = self.state.lock();
        if let Some(remaining) = state.fail_remove_counts.get_mut(&name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ContainerError::Runtime(format!(
                    "device busy removing {name}"
                )));
            }
        }
        state.containers.retain(|c| &c.id != id);
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, ContainerError> {
        self.record(Op::Create(spec.name.clone()));

        let mut state = self.state.lock();
        if let Some(message) = state.fail_create.get(&spec.name) {
            return Err(ContainerError::Runtime(message.clone()));
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(ContainerError::Conflict(spec.name.clone()));
        }

        state.next_id += 1;
        let id = ContainerId::new(format!("gen-{:04}", state.next_id));

        // The successor runs whatever the registry currently has for the ref;
        // the successor takes the predecessor's name, so the script keys match.
        let image_id = match state.stale.get(&spec.name) {
            Some(StaleScript::Stale(latest)) => latest.clone(),
            _ => ImageId::new(format!("sha256:img-{}", spec.name)),
        };

        let created = mock_time(1_700_000_000 + state.next_id as i64);

        state.containers.push(Container {
            id: id.clone(),
            name: spec.name.clone(),
            image_id,
            image_ref: spec.image.clone(),
            created,
            state: ContainerState::Stopped,
            links: Vec::new(),
            network_mode: spec.network_mode.clone(),
            labels: spec.labels.clone(),
            spec: spec.clone(),
        });

        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let name = self
            .name_of(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        self.record(Op::Start(name.clone()));

        let mut state = self.state.lock();
        if let Some(message) = state.fail_start.get(&name) {
            return Err(ContainerError::Runtime(message.clone()));
        }
        if let Some(c) = state.containers.iter_mut().find(|c| &c.id == id) {
            c.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        let name = self
            .name_of(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        self.record(Op::Rename(name, new_name.to_string()));

        let mut state = self.state.lock();
        if let Some(c) = state.containers.iter_mut().find(|c| &c.id == id) {
            c.name = new_name.to_string();
        }
        Ok(())
    }

    async fn wait_for_healthy(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let name = self
            .name_of(id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        self.record(Op::WaitHealthy(name.clone()));

        let state = self.state.lock();
        if state.fail_health.contains_key(&name) {
            return Err(ContainerError::HealthTimeout(timeout));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageOps for MockClient {
    async fn is_stale(&self, container: &Container) -> Result<Staleness, ImageError> {
        self.record(Op::StaleCheck(container.name.clone()));

        let state = self.state.lock();
        match state.stale.get(&container.name) {
            Some(StaleScript::Stale(latest)) => Ok(Staleness::Stale {
                latest: latest.clone(),
            }),
            Some(StaleScript::PullError(message)) => Err(ImageError::PullFailed(message.clone())),
            Some(StaleScript::Fresh) | None => Ok(Staleness::Fresh),
        }
    }

    async fn remove_image(&self, id: &ImageId, _name: &str) -> Result<(), ImageError> {
        self.record(Op::RemoveImage(id.to_string()));

        let state = self.state.lock();
        match state.remove_image_errors.get(id.as_str()) {
            Some(RemoveImageScript::NotFound) => Err(ImageError::NotFound(id.to_string())),
            Some(RemoveImageScript::InUse) => Err(ImageError::InUse(id.to_string())),
            Some(RemoveImageScript::Other(message)) => Err(ImageError::Runtime(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ExecOps for MockClient {
    async fn execute(
        &self,
        container: &ContainerId,
        command: &str,
        _timeout: Duration,
        _uid: Option<u32>,
        _gid: Option<u32>,
    ) -> Result<ExecOutcome, ExecError> {
        let name = self
            .name_of(container)
            .ok_or_else(|| ExecError::ContainerNotFound(container.to_string()))?;
        self.record(Op::Exec(name, command.to_string()));

        let state = self.state.lock();
        let exit_code = state.exec_codes.get(command).copied().unwrap_or(0);
        Ok(ExecOutcome {
            exit_code,
            output: String::new(),
        })
    }
}
