use std::{
    any::Any,
    fmt::{Display, Formatter},
    future::Future,
    panic,
    pin::pin,
    sync::Arc,
    time::Duration,
};

use futures_util::{future::select, FutureExt};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    pending_tasks::PendingTasks,
    shutdown::{ShutdownGuard, ShutdownSignal},
};

/// Error with the name of the task that panicked and an error downcasted to string, if possible.
#[derive(Debug, thiserror::Error)]
pub struct PanickedTaskError {
    task_name: String,
    error: Option<String>,
}

impl Display for PanickedTaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let task_name = &self.task_name;
        match &self.error {
            Some(error) => write!(f, "critical task `{task_name}` panicked: `{error}`"),
            None => write!(f, "critical task `{task_name}` panicked"),
        }
    }
}

impl PanickedTaskError {
    fn new(task_name: &str, error: Box<dyn Any + Send>) -> Self {
        let error = error
            .downcast::<String>()
            .map(|s| *s)
            .or_else(|e| e.downcast::<&str>().map(|s| s.to_string()))
            .ok();

        Self {
            task_name: task_name.to_string(),
            error,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Spawns and tracks long running tasks, watches for panics and drives graceful shutdown on
/// critical task panics and external signals.
#[derive(Debug)]
pub struct TaskManager {
    tokio_handle: Handle,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    panicked_tasks_rx: mpsc::UnboundedReceiver<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<PendingTasks>,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (panicked_tasks_tx, panicked_tasks_rx) = mpsc::unbounded_channel();

        Self {
            tokio_handle,
            panicked_tasks_tx,
            panicked_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
            pending_tasks: Arc::new(PendingTasks::default()),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            tokio_handle: self.tokio_handle.clone(),
            panicked_tasks_tx: self.panicked_tasks_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
            pending_tasks: self.pending_tasks.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Blocks until a task panics, returning the first panic, or until shutdown is signalled.
    fn wait_for_task_panic(&mut self) -> Result<(), PanickedTaskError> {
        let shutdown = self.shutdown_signal.clone();
        let rx = &mut self.panicked_tasks_rx;
        self.tokio_handle.block_on(async move {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(error) => Err(error),
                    None => Ok(()),
                },
                _ = shutdown.wait() => Ok(()),
            }
        })
    }

    /// Waits for every guarded task to drop its guard. Returns `false` if `timeout` expired first.
    fn wait_for_graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let wait = self.pending_tasks.clone().wait_for_zero();
        let done = match timeout {
            Some(t) => self
                .tokio_handle
                .block_on(tokio::time::timeout(t, wait))
                .is_ok(),
            None => {
                self.tokio_handle.block_on(wait);
                true
            }
        };

        if done {
            debug!("gracefully shut down");
        } else {
            debug!(remaining = %self.pending_tasks.current(), "graceful shutdown timed out");
        }
        done
    }

    /// Sends shutdown on ctrl+c.
    pub fn start_signal_listeners(&self) {
        let shutdown_signal = self.shutdown_signal();

        self.tokio_handle.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("got INT, initiating shutdown");
                shutdown_signal.send();
            }
        });
    }

    /// Blocks the current thread until shutdown is signalled or a critical task panics, then
    /// waits for guarded tasks to wind down.
    pub fn monitor(mut self, shutdown_timeout: Option<Duration>) -> Result<(), PanickedTaskError> {
        let res = self.wait_for_task_panic();

        self.shutdown_signal.send();
        if !self.wait_for_graceful_shutdown(shutdown_timeout) {
            info!("shutdown timeout expired, forcing shutdown");
        }

        res
    }
}

/// A cloneable handle that can spawn new critical tasks.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    tokio_handle: Handle,
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    shutdown_signal: ShutdownSignal,
    pending_tasks: Arc<PendingTasks>,
}

impl TaskExecutor {
    pub fn handle(&self) -> &Handle {
        &self.tokio_handle
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Wraps `fut` so a panic is reported to the manager instead of vanishing with the task.
    fn catch_panics(
        &self,
        name: &'static str,
        fut: impl Future<Output = ()> + Send + 'static,
    ) -> impl Future<Output = ()> + Send + 'static {
        let panicked_tasks_tx = self.panicked_tasks_tx.clone();
        panic::AssertUnwindSafe(fut).catch_unwind().map(move |res| {
            if let Err(error) = res {
                let task_error = PanickedTaskError::new(name, error);
                error!(%name, err = %task_error, "critical task failed");
                let _ = panicked_tasks_tx.send(task_error);
            }
        })
    }

    /// Spawns a future that is dropped when shutdown is signalled. A panic triggers shutdown.
    pub fn spawn_critical_async(
        &self,
        name: &'static str,
        fut: impl Future<Output = ()> + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        let shutdown = self.shutdown_signal.clone();
        let task = self.catch_panics(name, fut);

        info!(%name, "starting critical async task");
        self.tokio_handle.spawn(async move {
            let task = pin!(task);
            let shutdown = pin!(shutdown.wait());
            let _ = select(shutdown, task).await;
        })
    }

    /// Spawns a future that watches the passed [`ShutdownGuard`] and exits on its own. Shutdown
    /// waits for the guard to drop. A panic triggers shutdown.
    pub fn spawn_critical_async_with_shutdown<F>(
        &self,
        name: &'static str,
        async_func: impl FnOnce(ShutdownGuard) -> F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = ShutdownGuard::new(self.shutdown_signal.clone(), self.pending_tasks.clone());
        let task = self.catch_panics(name, async_func(guard));

        info!(%name, "starting critical async task with shutdown guard");
        self.tokio_handle.spawn(task)
    }
}
