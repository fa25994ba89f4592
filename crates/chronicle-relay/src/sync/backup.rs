//! Fire-and-forget replication of accepted events to backup relays.

use crate::host::RemotePool;
use crate::tasks::TaskSupervisor;
use metrics::counter;
use nostr_sdk::Event;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for a single publish to a backup relay.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes accepted events to every configured backup relay.
///
/// Each destination gets its own supervised task, so a slow or failing relay
/// never affects the others. Failures are logged and dropped.
pub struct BackupPropagator {
    pool: Arc<dyn RemotePool>,
    destinations: Vec<String>,
    timeout: Duration,
    supervisor: Arc<TaskSupervisor>,
}

impl BackupPropagator {
    pub fn new(
        pool: Arc<dyn RemotePool>,
        destinations: Vec<String>,
        supervisor: Arc<TaskSupervisor>,
    ) -> Self {
        Self {
            pool,
            destinations,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
            supervisor,
        }
    }

    /// Override the per-destination publish timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Start publishing `event` to every destination and return immediately.
    pub fn propagate(&self, event: &Event) {
        for url in &self.destinations {
            let publish = self.pool.publish(url.clone(), event.clone(), self.timeout);
            let url = url.clone();
            let id = event.id;

            self.supervisor.spawn_cancellable(async move {
                match publish.await {
                    Ok(()) => {
                        counter!("backup_publish_total", "result" => "ok").increment(1);
                    }
                    Err(e) => {
                        counter!("backup_publish_total", "result" => "error").increment(1);
                        tracing::warn!("Failed to propagate {} to backup relay {}: {}", id, url, e);
                    }
                }
            });
        }
    }
}
