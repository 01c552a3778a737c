//! Worker runtime primitives for the rank engine.
//!
//! Storage backends push blocking I/O through [`WorkerRuntime::run_blocking`]
//! and the engine schedules deferred reconciliation and its persistence queue
//! through [`WorkerRuntime::submit`].

mod budget;
mod class;
mod runtime;
mod spawn;
mod token;

pub use budget::{DrainBudget, DrainReport};
pub use class::TaskClass;
pub use runtime::{DEFAULT_IO_PERMITS, WorkerError, WorkerRuntime};
pub use spawn::{join_error_panic_message, spawn, spawn_blocking};
pub use token::{GenerationClock, ShutdownToken};
