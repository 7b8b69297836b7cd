//! Docker/Podman runtime over the engine API

use std::io;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput, LogsOptions};
use bollard::errors::Error as DockerError;
use bollard::Docker;
use futures::StreamExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use crate::relay::RelayError;

use super::{LogSource, RuntimeApi, RuntimeInfo};

/// Seconds before a request to the engine API times out.
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Runtime backed by the Docker engine API (Podman's compat socket works too).
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `docker_host`, or to the platform default socket when unset.
    pub fn connect(docker_host: Option<&str>) -> Result<Self, RelayError> {
        let docker = match docker_host {
            #[cfg(unix)]
            Some(host) if host.starts_with("unix://") => Docker::connect_with_unix(
                host,
                DOCKER_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => Docker::connect_with_http(
                host,
                DOCKER_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RelayError::RuntimeUnavailable(e.to_string()))?;

        info!(host = docker_host.unwrap_or("local default"), "Container runtime client created");
        Ok(Self { docker })
    }
}

/// Map an engine error for `container_id` onto the relay's error kinds.
fn classify(container_id: &str, err: DockerError) -> RelayError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => RelayError::TargetNotFound(container_id.to_string()),
        other => RelayError::RuntimeUnavailable(other.to_string()),
    }
}

#[async_trait]
impl RuntimeApi for DockerRuntime {
    async fn ping(&self) -> Result<RuntimeInfo, RelayError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RelayError::RuntimeUnavailable(e.to_string()))?;

        let version = self
            .docker
            .version()
            .await
            .map_err(|e| RelayError::RuntimeUnavailable(e.to_string()))?;

        Ok(RuntimeInfo {
            version: version.version,
            api_version: version.api_version,
        })
    }

    async fn inspect_target(&self, container_id: &str) -> Result<(), RelayError> {
        self.docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map(|_| ())
            .map_err(|e| classify(container_id, e))
    }

    async fn open_log_stream(&self, container_id: &str) -> Result<LogSource, RelayError> {
        // The log endpoint only reports a missing container once polled.
        self.inspect_target(container_id).await?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        debug!(container_id = %container_id, "Opening container log stream");

        let stream = self.docker.logs(container_id, Some(options)).map(|item| {
            item.map(LogOutput::into_bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        });

        Ok(LogSource::new(StreamReader::new(stream)))
    }
}
