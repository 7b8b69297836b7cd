//! Active relay sessions and process-wide shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::RelaySummary;

use super::session::RelaySession;

/// How often `wait_idle` re-checks the session count.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tracks running relay sessions by ID.
///
/// Sessions share nothing with each other; the registry only exists so they
/// can be listed, cancelled one by one, or all stopped at shutdown.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<RelaySession>>>,
    shutdown: CancellationToken,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token every session watches for process shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn insert(&self, session: Arc<RelaySession>) {
        crate::metrics::record_relay_started();
        self.sessions
            .write()
            .await
            .insert(session.session_id, session);
    }

    /// Insert `session` and keep it listed until the returned guard drops.
    pub async fn register(self: &Arc<Self>, session: Arc<RelaySession>) -> Registration {
        let session_id = session.session_id;
        self.insert(session).await;
        Registration {
            registry: self.clone(),
            session_id,
        }
    }

    pub async fn remove(&self, session_id: &Uuid) -> Option<Arc<RelaySession>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn list(&self) -> Vec<RelaySummary> {
        let mut relays: Vec<RelaySummary> = self
            .sessions
            .read()
            .await
            .values()
            .map(|session| session.summary())
            .collect();
        relays.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        relays
    }

    /// Cancel one session. Returns `false` if no such session is running.
    pub async fn cancel(&self, session_id: &Uuid) -> bool {
        let session = self.sessions.read().await.get(session_id).cloned();
        match session {
            Some(session) => {
                if session.cancel() {
                    info!(session_id = %session_id, "Relay session cancelled");
                }
                true
            }
            None => false,
        }
    }

    pub async fn active_count(&self) -> u64 {
        self.sessions.read().await.len() as u64
    }

    /// Tell every session, current and future, to stop.
    pub fn begin_shutdown(&self) {
        info!("Stopping all relay sessions");
        self.shutdown.cancel();
    }

    /// Wait up to `grace` for all sessions to close. Returns how many remain.
    pub async fn wait_idle(&self, grace: Duration) -> u64 {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let remaining = self.active_count().await;
            if remaining == 0 || tokio::time::Instant::now() >= deadline {
                debug!(remaining, "Relay registry idle wait finished");
                return remaining;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

/// Removes its session from the registry on drop, including on panic.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<RelayRegistry>,
    session_id: Uuid,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let session_id = self.session_id;
        let removed = match self.registry.sessions.try_write() {
            Ok(mut sessions) => {
                sessions.remove(&session_id);
                true
            }
            Err(_) => false,
        };
        if removed {
            return;
        }

        // Lock is busy: finish the removal in the background
        let registry = self.registry.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                registry.remove(&session_id).await;
            });
        }
    }
}
