// ABOUTME: Bollard-based runtime client implementation.
// ABOUTME: Works against Docker and Podman via the Docker-compatible API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding, RestartPolicy};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RemoveImageOptions, RenameContainerOptions, StopContainerOptions,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::container::{Container, ContainerState};
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::{
    ContainerError, ContainerOps, CreateSpec, ExecError, ExecOps, ExecOutcome, ImageError,
    ImageOps, Staleness,
};
use crate::types::{ContainerId, ImageId, ImageRef};

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_remove_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 && message.contains("removal") => {
            ContainerError::RemovalInProgress(message.clone())
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::Conflict(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::Conflict(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_image_pull_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 401 || *status_code == 403 => {
            ImageError::AuthenticationFailed(message.clone())
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ImageError::NotFound(format!("{image_name}: {message}")),
        _ => ImageError::PullFailed(format!("{image_name}: {e}")),
    }
}

fn map_image_remove_error(e: bollard::errors::Error, image_name: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code, ..
        } if *status_code == 404 => ImageError::NotFound(image_name.to_string()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ImageError::InUse(message.clone()),
        _ => ImageError::Runtime(format!("failed to remove {image_name}: {e}")),
    }
}

fn map_exec_create_error(e: bollard::errors::Error) -> ExecError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ExecError::ContainerNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ExecError::ContainerNotRunning(message.clone()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

// =============================================================================
// DockerClient
// =============================================================================

/// Runtime client implementation using bollard against the local socket.
pub struct DockerClient {
    client: Docker,
}

impl DockerClient {
    /// Create a client from an existing bollard handle.
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the default local socket.
    pub fn connect_local() -> Result<Self, ContainerError> {
        let client = Docker::connect_with_unix_defaults()
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;
        Ok(Self::new(client))
    }

    async fn inspect_to_container(&self, id: &str) -> Result<Container, ContainerError> {
        let details = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let name = details
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                bollard::models::ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                _ => ContainerState::Stopped,
            })
            .unwrap_or(ContainerState::Stopped);

        let created = details
            .created
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw.to_string()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let config = details.config.unwrap_or_default();
        let host_config = details.host_config.unwrap_or_default();

        let labels = config.labels.clone().unwrap_or_default();
        let image_ref = config.image.clone().unwrap_or_default();
        let image_id = ImageId::new(details.image.unwrap_or_default());

        let links = host_config
            .links
            .clone()
            .unwrap_or_default()
            .iter()
            .filter_map(|l| link_target_name(l))
            .collect();

        let network_mode = host_config.network_mode.clone();

        let ports = host_config
            .port_bindings
            .as_ref()
            .map(|bindings| flatten_port_bindings(bindings))
            .unwrap_or_default();

        let spec = CreateSpec {
            name: name.clone(),
            image: image_ref.clone(),
            env: config.env.clone().unwrap_or_default(),
            labels: labels.clone(),
            cmd: config.cmd.clone().unwrap_or_default(),
            entrypoint: config.entrypoint.clone(),
            user: config.user.clone().filter(|u| !u.is_empty()),
            working_dir: config.working_dir.clone().filter(|w| !w.is_empty()),
            binds: host_config.binds.clone().unwrap_or_default(),
            ports,
            network_mode: network_mode.clone(),
            links: host_config.links.clone().unwrap_or_default(),
            restart_policy: host_config
                .restart_policy
                .as_ref()
                .and_then(|p| p.name)
                .map(|n| n.to_string())
                .filter(|n| !n.is_empty()),
            cpuset_cpus: host_config.cpuset_cpus.clone().filter(|c| !c.is_empty()),
            stop_timeout: config
                .stop_timeout
                .and_then(|t| u64::try_from(t).ok())
                .map(Duration::from_secs),
        };

        Ok(Container {
            id: ContainerId::new(details.id.unwrap_or_default()),
            name,
            image_id,
            image_ref,
            created,
            state,
            links,
            network_mode,
            labels,
            spec,
        })
    }
}

/// Extract the target container name from a legacy link entry.
///
/// Links appear as `/target:/source/alias`.
fn link_target_name(raw: &str) -> Option<String> {
    let target = raw.split(':').next()?;
    let name = target.trim_start_matches('/');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Collapse inspect port bindings back into `host:container/proto` entries.
fn flatten_port_bindings(
    bindings: &HashMap<String, Option<Vec<PortBinding>>>,
) -> Vec<String> {
    let mut out = Vec::new();
    for (container_port, hosts) in bindings {
        match hosts {
            Some(hosts) if !hosts.is_empty() => {
                for binding in hosts {
                    let host_port = binding.host_port.clone().unwrap_or_default();
                    out.push(format!("{host_port}:{container_port}"));
                }
            }
            _ => out.push(container_port.clone()),
        }
    }
    out.sort();
    out
}

fn restart_policy_from_name(name: &str) -> Option<RestartPolicy> {
    use bollard::models::RestartPolicyNameEnum;
    let value = match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => return None,
    };
    Some(RestartPolicy {
        name: Some(value),
        maximum_retry_count: None,
    })
}

// Implement Sealed trait to allow runtime trait implementations
impl Sealed for DockerClient {}

#[async_trait]
impl ContainerOps for DockerClient {
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<Container>, ContainerError> {
        let opts = ListContainersOptions {
            all: include_stopped,
            ..Default::default()
        };

        let summaries = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect_to_container(&id).await {
                Ok(container) => containers.push(container),
                // Listed containers can disappear before we inspect them.
                Err(ContainerError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(containers)
    }

    async fn get_container(&self, id: &ContainerId) -> Result<Container, ContainerError> {
        self.inspect_to_container(id.as_str()).await
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn stop_and_remove(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        match self.stop_container(id, timeout).await {
            Ok(()) => {}
            Err(ContainerError::NotFound(_)) => return Ok(()),
            Err(ContainerError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self
            .client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_remove_error)
        {
            Ok(()) => Ok(()),
            Err(ContainerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, ContainerError> {
        let host_config = HostConfig {
            binds: if spec.binds.is_empty() {
                None
            } else {
                Some(spec.binds.clone())
            },
            links: if spec.links.is_empty() {
                None
            } else {
                Some(spec.links.clone())
            },
            network_mode: spec.network_mode.clone(),
            restart_policy: spec
                .restart_policy
                .as_deref()
                .and_then(restart_policy_from_name),
            cpuset_cpus: spec.cpuset_cpus.clone(),
            port_bindings: build_port_bindings(&spec.ports),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            cmd: if spec.cmd.is_empty() {
                None
            } else {
                Some(spec.cmd.clone())
            },
            entrypoint: spec.entrypoint.clone(),
            user: spec.user.clone(),
            working_dir: spec.working_dir.clone(),
            stop_timeout: spec.stop_timeout.map(|d| d.as_secs() as i64),
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_not_found_error)
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(map_container_not_found_error)
    }

    async fn wait_for_healthy(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let start = tokio::time::Instant::now();
        let poll_interval = Duration::from_secs(1);

        loop {
            let details = self
                .client
                .inspect_container(id.as_str(), None::<InspectContainerOptions>)
                .await
                .map_err(map_container_not_found_error)?;

            let state = details.state.as_ref();
            let health = state.and_then(|s| s.health.as_ref()).and_then(|h| h.status);

            match health {
                Some(bollard::models::HealthStatusEnum::HEALTHY) => return Ok(()),
                Some(bollard::models::HealthStatusEnum::UNHEALTHY) => {
                    return Err(ContainerError::Unhealthy(id.to_string()));
                }
                Some(_) => {}
                // No health probe configured: running is as healthy as it gets.
                None => {
                    if state.and_then(|s| s.running).unwrap_or(false) {
                        return Ok(());
                    }
                }
            }

            if start.elapsed() >= timeout {
                return Err(ContainerError::HealthTimeout(timeout));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn build_port_bindings(ports: &[String]) -> Option<HashMap<String, Option<Vec<PortBinding>>>> {
    if ports.is_empty() {
        return None;
    }

    let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for entry in ports {
        match entry.split_once(':') {
            Some((host, container)) => {
                bindings
                    .entry(container.to_string())
                    .or_insert_with(|| Some(Vec::new()))
                    .get_or_insert_with(Vec::new)
                    .push(PortBinding {
                        host_ip: None,
                        host_port: Some(host.to_string()),
                    });
            }
            None => {
                bindings.entry(entry.clone()).or_insert(None);
            }
        }
    }
    Some(bindings)
}

#[async_trait]
impl ImageOps for DockerClient {
    async fn is_stale(&self, container: &Container) -> Result<Staleness, ImageError> {
        let reference = ImageRef::parse(&container.image_ref)
            .map_err(|e| ImageError::Runtime(e.to_string()))?;
        let image_name = reference.to_string();

        tracing::debug!(image = %image_name, "pulling candidate image");

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| map_image_pull_error(e, &image_name))?;
        }

        let inspected = self
            .client
            .inspect_image(&image_name)
            .await
            .map_err(|e| map_image_pull_error(e, &image_name))?;

        let latest = ImageId::new(inspected.id.unwrap_or_default());
        if latest.is_empty() || latest == container.image_id {
            Ok(Staleness::Fresh)
        } else {
            Ok(Staleness::Stale { latest })
        }
    }

    async fn remove_image(&self, id: &ImageId, name: &str) -> Result<(), ImageError> {
        let opts = RemoveImageOptions {
            force: false,
            ..Default::default()
        };

        self.client
            .remove_image(id.as_str(), Some(opts), None)
            .await
            .map_err(|e| map_image_remove_error(e, name))?;

        Ok(())
    }
}

#[async_trait]
impl ExecOps for DockerClient {
    async fn execute(
        &self,
        container: &ContainerId,
        command: &str,
        timeout: Duration,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<ExecOutcome, ExecError> {
        let user = match (uid, gid) {
            (Some(u), Some(g)) => Some(format!("{u}:{g}")),
            (Some(u), None) => Some(u.to_string()),
            (None, Some(g)) => Some(format!("0:{g}")),
            (None, None) => None,
        };

        let config = bollard::models::ExecConfig {
            cmd: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                command.to_string(),
            ]),
            user,
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self
            .client
            .create_exec(container.as_str(), config)
            .await
            .map_err(map_exec_create_error)?;

        let run = async {
            let mut output = bytes::BytesMut::new();

            let started = self
                .client
                .start_exec(&created.id, None::<bollard::exec::StartExecOptions>)
                .await
                .map_err(|e| ExecError::Runtime(e.to_string()))?;

            if let bollard::exec::StartExecResults::Attached {
                output: mut stream, ..
            } = started
            {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(frame) => output.extend_from_slice(&frame.into_bytes()),
                        Err(e) => return Err(ExecError::Runtime(e.to_string())),
                    }
                }
            }

            let details = self
                .client
                .inspect_exec(&created.id)
                .await
                .map_err(|e| ExecError::Runtime(e.to_string()))?;

            Ok(ExecOutcome {
                exit_code: details.exit_code.unwrap_or(0),
                output: String::from_utf8_lossy(&output).to_string(),
            })
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_target_name_strips_alias() {
        assert_eq!(link_target_name("/db:/app/db"), Some("db".to_string()));
        assert_eq!(link_target_name("/cache"), Some("cache".to_string()));
        assert_eq!(link_target_name(""), None);
    }

    #[test]
    fn port_bindings_round_trip() {
        let flattened = vec!["8080:80/tcp".to_string()];
        let built = build_port_bindings(&flattened).unwrap();
        let hosts = built.get("80/tcp").unwrap().as_ref().unwrap();
        assert_eq!(hosts[0].host_port.as_deref(), Some("8080"));
    }

    #[test]
    fn exposed_only_port_keeps_no_binding() {
        let built = build_port_bindings(&["9000/udp".to_string()]).unwrap();
        assert!(built.get("9000/udp").unwrap().is_none());
    }

    #[test]
    fn restart_policy_names_map() {
        assert!(restart_policy_from_name("unless-stopped").is_some());
        assert!(restart_policy_from_name("bogus").is_none());
    }
}
