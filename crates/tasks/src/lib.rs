//! Supervision of long running tasks: critical task spawning with panic capture, graceful
//! shutdown, and the abort signal threaded through cancellable work.

mod abort;
mod manager;
mod pending_tasks;
mod print_panic;
mod shutdown;

pub use abort::AbortSignal;
pub use manager::{PanickedTaskError, TaskExecutor, TaskManager};
pub use print_panic::set_panic_hook;
pub use shutdown::{ShutdownGuard, ShutdownSignal};
