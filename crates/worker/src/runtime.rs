use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Semaphore, watch};

use crate::budget::{DrainBudget, DrainReport};
use crate::{TaskClass, join_error_panic_message, spawn, spawn_blocking};

/// Default number of blocking storage calls allowed in flight at once.
pub const DEFAULT_IO_PERMITS: usize = 4;

/// Errors from running work on the worker runtime.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
	#[error("worker task panicked: {0}")]
	Panicked(String),
	#[error("worker task was cancelled")]
	Cancelled,
	#[error("blocking pool is shut down")]
	Closed,
}

/// Per-class in-flight counters observed by [`WorkerRuntime::drain`].
#[derive(Debug)]
struct Inflight {
	deferred: watch::Sender<usize>,
	background: watch::Sender<usize>,
	io: watch::Sender<usize>,
}

impl Inflight {
	fn new() -> Self {
		Self {
			deferred: watch::Sender::new(0),
			background: watch::Sender::new(0),
			io: watch::Sender::new(0),
		}
	}

	fn counter(&self, class: TaskClass) -> &watch::Sender<usize> {
		match class {
			TaskClass::Deferred => &self.deferred,
			TaskClass::Background => &self.background,
			TaskClass::IoBlocking => &self.io,
		}
	}
}

/// Decrements its class counter on drop, including when the task unwinds.
struct InflightGuard {
	inflight: Arc<Inflight>,
	class: TaskClass,
}

impl InflightGuard {
	fn enter(inflight: &Arc<Inflight>, class: TaskClass) -> Self {
		inflight.counter(class).send_modify(|n| *n += 1);
		Self {
			inflight: Arc::clone(inflight),
			class,
		}
	}
}

impl Drop for InflightGuard {
	fn drop(&mut self) {
		self.inflight.counter(self.class).send_modify(|n| *n = n.saturating_sub(1));
	}
}

/// Runtime entrypoint shared by the rank engine and its storage backends.
///
/// Blocking I/O is bounded by a semaphore so a burst of joins cannot occupy
/// the whole blocking pool. Managed tasks are counted per class so callers
/// can wait for deferred work to settle with [`Self::drain`].
#[derive(Debug, Clone)]
pub struct WorkerRuntime {
	inflight: Arc<Inflight>,
	io_permits: Arc<Semaphore>,
}

impl Default for WorkerRuntime {
	fn default() -> Self {
		Self::new()
	}
}

impl WorkerRuntime {
	/// Creates a runtime with [`DEFAULT_IO_PERMITS`] blocking slots.
	pub fn new() -> Self {
		Self::with_io_limit(DEFAULT_IO_PERMITS)
	}

	/// Creates a runtime allowing at most `permits` concurrent blocking calls.
	pub fn with_io_limit(permits: usize) -> Self {
		Self {
			inflight: Arc::new(Inflight::new()),
			io_permits: Arc::new(Semaphore::new(permits.max(1))),
		}
	}

	/// Submits managed work tracked by [`Self::drain`].
	pub fn submit<F>(&self, class: TaskClass, fut: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let guard = InflightGuard::enter(&self.inflight, class);
		let _detached = spawn(class, async move {
			let _guard = guard;
			fut.await;
		});
	}

	/// Runs blocking work on the bounded pool and awaits its result.
	pub async fn run_blocking<F, R>(&self, f: F) -> Result<R, WorkerError>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		let permit = Arc::clone(&self.io_permits).acquire_owned().await.map_err(|_| WorkerError::Closed)?;
		let guard = InflightGuard::enter(&self.inflight, TaskClass::IoBlocking);
		let handle = spawn_blocking(TaskClass::IoBlocking, move || {
			let _permit = permit;
			let _guard = guard;
			f()
		});
		match handle.await {
			Ok(value) => Ok(value),
			Err(err) => match join_error_panic_message(err) {
				Some(msg) => {
					tracing::error!(error = %msg, "worker.blocking_panicked");
					Err(WorkerError::Panicked(msg))
				}
				None => Err(WorkerError::Cancelled),
			},
		}
	}

	/// Waits until every managed task has finished or the budget runs out.
	pub async fn drain(&self, budget: DrainBudget) -> DrainReport {
		let deadline = Instant::now() + budget.duration;
		let mut exhausted = false;

		for class in [TaskClass::Deferred, TaskClass::Background, TaskClass::IoBlocking] {
			let mut rx = self.inflight.counter(class).subscribe();
			let remaining = deadline.saturating_duration_since(Instant::now());
			if tokio::time::timeout(remaining, rx.wait_for(|n| *n == 0)).await.is_err() {
				exhausted = true;
				break;
			}
		}

		let report = DrainReport {
			pending_deferred: self.pending(TaskClass::Deferred),
			pending_background: self.pending(TaskClass::Background),
			pending_io: self.pending(TaskClass::IoBlocking),
			budget_exhausted: exhausted,
		};
		if !report.is_settled() {
			tracing::debug!(?report, "worker.drain_unsettled");
		}
		report
	}

	/// Returns the number of managed tasks of `class` still running.
	pub fn pending(&self, class: TaskClass) -> usize {
		*self.inflight.counter(class).borrow()
	}
}
