//! Supervision of detached background work.
//!
//! Conversation backfills and backup publishes run as detached tasks so they
//! never hold up the event path. Every such task is spawned through a
//! [`TaskSupervisor`], which cancels all of them on shutdown.

use parking_lot::Mutex;
use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner of the engine's detached tasks.
#[derive(Debug)]
pub struct TaskSupervisor {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSupervisor {
    /// Create a supervisor with no running tasks.
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task that is dropped as soon as shutdown is requested.
    ///
    /// Does nothing once the supervisor has been shut down.
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// A receiver that flips to `true` when shutdown is requested.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of tasks that have not finished yet.
    pub fn active(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Cancel every task and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_cancels_pending_tasks() {
        let supervisor = TaskSupervisor::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        supervisor.spawn_cancellable(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(supervisor.active(), 1);

        supervisor.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(supervisor.active(), 0);
    }

    #[tokio::test]
    async fn test_no_spawn_after_shutdown() {
        let supervisor = TaskSupervisor::new();
        supervisor.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        supervisor.spawn_cancellable(async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!ran.load(Ordering::SeqCst));
        assert!(supervisor.is_shutdown());
    }

    #[tokio::test]
    async fn test_completed_tasks_run_to_the_end() {
        let supervisor = TaskSupervisor::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        supervisor.spawn_cancellable(async move {
            let _ = tx.send(42);
        });

        assert_eq!(rx.await.unwrap(), 42);
    }
}
