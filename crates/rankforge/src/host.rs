//! The surface the engine drives on the live server.
//!
//! The engine never reaches into host internals. Everything it pushes to a
//! connected entity goes through [`LiveEntity`], and unknown permission nodes
//! are declared through [`PermissionHost`].

use std::fmt;
use std::sync::Arc;

use crate::error::HostError;
use crate::model::EntityId;
use crate::presentation::DisplayLabel;

/// Identifies one grant bundle the engine attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleId(u64);

impl BundleId {
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for BundleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "bundle#{}", self.0)
	}
}

/// An ordered set of node decisions attached to an entity as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionBundle {
	id: BundleId,
	entries: Vec<(String, bool)>,
}

impl PermissionBundle {
	pub fn new(id: BundleId) -> Self {
		Self {
			id,
			entries: Vec::new(),
		}
	}

	pub fn id(&self) -> BundleId {
		self.id
	}

	/// Sets `node`, replacing an earlier decision for the same node in place.
	pub fn set(&mut self, node: &str, value: bool) {
		match self.entries.iter_mut().find(|(n, _)| n == node) {
			Some(entry) => entry.1 = value,
			None => self.entries.push((node.to_string(), value)),
		}
	}

	pub fn entries(&self) -> &[(String, bool)] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// A connected entity as seen by the engine.
///
/// Calls are made from inside the entity's critical section and must not
/// block on the engine.
pub trait LiveEntity: Send + Sync {
	fn id(&self) -> EntityId;

	fn display_name(&self) -> String;

	fn is_online(&self) -> bool;

	fn attach_bundle(&self, bundle: &PermissionBundle) -> Result<(), HostError>;

	fn detach_bundle(&self, bundle: BundleId) -> Result<(), HostError>;

	/// Removes every bundle this engine ever attached to the entity.
	fn clear_bundles(&self) -> Result<(), HostError>;

	/// Asks the host to recompute the entity's effective permissions.
	fn recalculate(&self) -> Result<(), HostError>;

	/// Host-side answer for `node` after the last recalculation.
	fn has_permission(&self, node: &str) -> bool;

	fn set_display_label(&self, label: &DisplayLabel) -> Result<(), HostError>;

	fn reset_display_label(&self) -> Result<(), HostError>;
}

/// Shared handle to a live entity.
pub type EntityHandle = Arc<dyn LiveEntity>;

/// Host-wide permission node registry.
pub trait PermissionHost: Send + Sync {
	fn is_registered(&self, node: &str) -> bool;

	/// Declares `node` with a default-deny value.
	fn register(&self, node: &str) -> Result<(), HostError>;
}

/// Host that accepts every node without tracking it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenHost;

impl PermissionHost for OpenHost {
	fn is_registered(&self, _node: &str) -> bool {
		true
	}

	fn register(&self, _node: &str) -> Result<(), HostError> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bundle_keeps_order_and_last_decision() {
		let mut bundle = PermissionBundle::new(BundleId::new(7));
		bundle.set("kit.vip", true);
		bundle.set("fly", true);
		bundle.set("kit.vip", false);
		assert_eq!(bundle.id().get(), 7);
		assert_eq!(bundle.entries(), &[("kit.vip".to_string(), false), ("fly".to_string(), true)]);
	}
}
