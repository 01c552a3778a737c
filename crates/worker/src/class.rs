/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Follow-up work that touches live entity state after a delay, such as
	/// permission reconciliation.
	Deferred,
	/// Async work that nothing waits on directly, such as the persistence queue.
	Background,
	/// Blocking storage I/O executed on the bounded blocking pool.
	IoBlocking,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Deferred => "deferred",
			Self::Background => "background",
			Self::IoBlocking => "io_blocking",
		}
	}
}
