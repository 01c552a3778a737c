//! The rank registry: an atomically swapped, immutable rank table.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::model::RankDefinition;

mod load;
mod table;

pub use load::{RankLoadReport, is_valid_rank_name, load_rank_table};
pub use table::{DefaultResolution, RankTable, SYNTHETIC_DEFAULT_NAME};

/// Holds the current [`RankTable`].
///
/// Readers take an `Arc` snapshot and never see a half-built table. Reloads
/// are serialised by their own lock, independent of any entity lock.
pub struct RankRegistry {
	table: ArcSwap<RankTable>,
	reload_lock: Mutex<()>,
}

impl RankRegistry {
	pub fn new(table: RankTable) -> Self {
		Self {
			table: ArcSwap::from_pointee(table),
			reload_lock: Mutex::new(()),
		}
	}

	/// Builds a registry from a rank source, logging every skipped entry.
	pub fn from_source(source: &str) -> (Self, RankLoadReport) {
		let report = load_rank_table(source);
		(Self::new(report.table.clone()), report)
	}

	/// Current table snapshot.
	pub fn snapshot(&self) -> Arc<RankTable> {
		self.table.load_full()
	}

	/// Case-insensitive rank lookup.
	pub fn resolve(&self, name: &str) -> Option<Arc<RankDefinition>> {
		self.table.load().get(name).cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.table.load().contains(name)
	}

	pub fn default_rank(&self) -> Arc<RankDefinition> {
		Arc::clone(self.table.load().default_rank())
	}

	/// Ranks in source order.
	pub fn list(&self) -> Vec<Arc<RankDefinition>> {
		self.table.load().iter().cloned().collect()
	}

	/// Ranks by descending weight.
	pub fn list_sorted(&self) -> Vec<Arc<RankDefinition>> {
		self.table.load().sorted_by_weight()
	}

	/// Parses `source` and swaps the result in. Always succeeds; problems are
	/// listed in the returned report.
	pub fn reload(&self, source: &str) -> RankLoadReport {
		let _reload = self.reload_lock.lock();
		let report = load_rank_table(source);
		self.table.store(Arc::new(report.table.clone()));
		report
	}

	/// Replaces the table, returning the previous one.
	pub fn swap(&self, table: RankTable) -> Arc<RankTable> {
		let _reload = self.reload_lock.lock();
		self.table.swap(Arc::new(table))
	}
}

impl Default for RankRegistry {
	fn default() -> Self {
		Self::new(RankTable::fallback())
	}
}

impl std::fmt::Debug for RankRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let table = self.table.load();
		f.debug_struct("RankRegistry")
			.field("ranks", &table.len())
			.field("default", &table.default_rank().name)
			.finish()
	}
}
