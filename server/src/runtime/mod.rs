//! Container runtime access
//!
//! The runtime is an external collaborator. The relay needs only a
//! reachability check, an existence check and a follow-mode log stream, so
//! that is all the trait exposes.

mod docker;
mod source;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::relay::RelayError;

pub use docker::DockerRuntime;
pub use source::LogSource;

/// Runtime daemon identification returned by [`RuntimeApi::ping`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub version: Option<String>,
    pub api_version: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// Check that the daemon answers.
    async fn ping(&self) -> Result<RuntimeInfo, RelayError>;

    /// Fail with `TargetNotFound` if the container does not exist.
    async fn inspect_target(&self, container_id: &str) -> Result<(), RelayError>;

    /// Open the container's combined stdout/stderr log in follow mode.
    async fn open_log_stream(&self, container_id: &str) -> Result<LogSource, RelayError>;
}
