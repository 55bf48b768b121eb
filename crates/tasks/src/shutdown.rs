use std::sync::Arc;

use crate::{abort::AbortSignal, pending_tasks::PendingTasks};

/// Broadcast trigger that asks every supervised task to wind down.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(AbortSignal);

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Send shutdown signal
    pub fn send(&self) {
        self.0.abort();
    }

    pub fn is_sent(&self) -> bool {
        self.0.is_aborted()
    }

    pub(crate) async fn wait(&self) {
        self.0.aborted().await
    }
}

/// Handed to tasks that shut themselves down. Keeps the manager waiting until dropped.
#[derive(Debug)]
pub struct ShutdownGuard {
    signal: ShutdownSignal,
    pending: Arc<PendingTasks>,
}

impl ShutdownGuard {
    pub(crate) fn new(signal: ShutdownSignal, pending: Arc<PendingTasks>) -> Self {
        pending.increment();
        Self { signal, pending }
    }

    /// Check if shutdown signal has been sent
    pub fn should_shutdown(&self) -> bool {
        self.signal.is_sent()
    }

    /// Waits until shutdown signal is sent
    pub async fn wait_for_shutdown(&self) {
        self.signal.wait().await
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.pending.decrement();
    }
}
