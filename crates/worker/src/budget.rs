use std::time::Duration;

/// Time budget for [`crate::WorkerRuntime::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudget {
	pub duration: Duration,
}

impl DrainBudget {
	pub const fn new(duration: Duration) -> Self {
		Self { duration }
	}
}

impl Default for DrainBudget {
	fn default() -> Self {
		Self::new(Duration::from_secs(5))
	}
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
	pub pending_deferred: usize,
	pub pending_background: usize,
	pub pending_io: usize,
	pub budget_exhausted: bool,
}

impl DrainReport {
	/// Returns true when no managed task was left running.
	pub fn is_settled(&self) -> bool {
		self.pending_deferred == 0 && self.pending_background == 0 && self.pending_io == 0
	}
}
