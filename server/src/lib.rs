//! dockweb server library
//!
//! Relays live container logs to browser clients over WebSocket.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod runtime;

use relay::{OriginPolicy, RelayRegistry, SinkFactory};
use runtime::RuntimeApi;

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub runtime: Arc<dyn RuntimeApi>,
    pub relays: Arc<RelayRegistry>,
    pub sinks: SinkFactory,
}

impl AppState {
    pub fn new(config: config::AppConfig, runtime: Arc<dyn RuntimeApi>) -> Self {
        let sinks = SinkFactory::new(
            OriginPolicy::new(config.allowed_origins.clone()),
            config.relay.limits(),
        );
        Self {
            config,
            runtime,
            relays: Arc::new(RelayRegistry::new()),
            sinks,
        }
    }
}
