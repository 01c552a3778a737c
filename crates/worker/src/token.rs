use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock.
///
/// Each entity session is stamped with a generation so a storage load that
/// completes after a quit/rejoin can tell it belongs to a stale session.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	/// Returns the most recently issued generation, or 0 if none was issued.
	pub fn current(&self) -> u64 {
		self.next.load(Ordering::Acquire)
	}
}

/// Cancellation handle for long-lived worker loops.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
	cancel: CancellationToken,
}

impl ShutdownToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true when shutdown was requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests shutdown of every loop holding this token or a child of it.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when shutdown is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	/// Creates a child token cancelled together with this one.
	pub fn child(&self) -> Self {
		Self {
			cancel: self.cancel.child_token(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generations_are_monotonic_and_shared_across_clones() {
		let clock = GenerationClock::new();
		assert_eq!(clock.current(), 0);
		let a = clock.next();
		let b = clock.clone().next();
		assert_eq!((a, b), (1, 2));
		assert_eq!(clock.current(), 2);
	}

	#[test]
	fn child_token_follows_parent() {
		let parent = ShutdownToken::new();
		let child = parent.child();
		assert!(!child.is_cancelled());
		parent.cancel();
		assert!(child.is_cancelled());
	}
}
