//! In-memory host doubles with failure switches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;

use crate::error::HostError;
use crate::host::{BundleId, LiveEntity, PermissionBundle, PermissionHost};
use crate::model::EntityId;
use crate::permission::{EffectivePermissions, PermissionToken};
use crate::presentation::DisplayLabel;

#[derive(Debug, Default)]
struct EntityState {
	bundles: Vec<PermissionBundle>,
	effective: EffectivePermissions,
	label: Option<DisplayLabel>,
}

/// A connected entity that records everything pushed to it.
#[derive(Debug)]
pub struct FakeEntity {
	id: EntityId,
	name: String,
	online: AtomicBool,
	state: Mutex<EntityState>,
	recalculations: AtomicUsize,
	/// Upcoming recalculations that silently leave the old effective set.
	stale_recalcs: AtomicUsize,
	fail_detach: AtomicBool,
	fail_attach: AtomicBool,
	fail_label: AtomicBool,
}

impl FakeEntity {
	pub fn new(id: EntityId, name: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			id,
			name: name.into(),
			online: AtomicBool::new(true),
			state: Mutex::new(EntityState::default()),
			recalculations: AtomicUsize::new(0),
			stale_recalcs: AtomicUsize::new(0),
			fail_detach: AtomicBool::new(false),
			fail_attach: AtomicBool::new(false),
			fail_label: AtomicBool::new(false),
		})
	}

	pub fn random(name: impl Into<String>) -> Arc<Self> {
		Self::new(EntityId::random(), name)
	}

	pub fn set_online(&self, online: bool) {
		self.online.store(online, Ordering::SeqCst);
	}

	pub fn fail_detach(&self, fail: bool) {
		self.fail_detach.store(fail, Ordering::SeqCst);
	}

	pub fn fail_attach(&self, fail: bool) {
		self.fail_attach.store(fail, Ordering::SeqCst);
	}

	pub fn fail_label(&self, fail: bool) {
		self.fail_label.store(fail, Ordering::SeqCst);
	}

	/// Makes the next `count` recalculations no-ops.
	pub fn lag_recalculations(&self, count: usize) {
		self.stale_recalcs.store(count, Ordering::SeqCst);
	}

	pub fn recalculations(&self) -> usize {
		self.recalculations.load(Ordering::SeqCst)
	}

	pub fn bundle_ids(&self) -> Vec<BundleId> {
		self.state.lock().bundles.iter().map(PermissionBundle::id).collect()
	}

	pub fn label(&self) -> Option<DisplayLabel> {
		self.state.lock().label.clone()
	}

	fn recompute(state: &mut EntityState) {
		state.effective = state
			.bundles
			.iter()
			.flat_map(|b| b.entries().iter())
			.map(|(node, value)| PermissionToken {
				node: node.clone(),
				value: *value,
			})
			.collect();
	}
}

impl LiveEntity for FakeEntity {
	fn id(&self) -> EntityId {
		self.id
	}

	fn display_name(&self) -> String {
		self.name.clone()
	}

	fn is_online(&self) -> bool {
		self.online.load(Ordering::SeqCst)
	}

	fn attach_bundle(&self, bundle: &PermissionBundle) -> Result<(), HostError> {
		if self.fail_attach.load(Ordering::SeqCst) {
			return Err(HostError::Rejected("attach refused".into()));
		}
		self.state.lock().bundles.push(bundle.clone());
		Ok(())
	}

	fn detach_bundle(&self, bundle: BundleId) -> Result<(), HostError> {
		if self.fail_detach.load(Ordering::SeqCst) {
			return Err(HostError::Rejected("detach refused".into()));
		}
		self.state.lock().bundles.retain(|b| b.id() != bundle);
		Ok(())
	}

	fn clear_bundles(&self) -> Result<(), HostError> {
		self.state.lock().bundles.clear();
		Ok(())
	}

	fn recalculate(&self) -> Result<(), HostError> {
		if !self.is_online() {
			return Err(HostError::Offline);
		}
		self.recalculations.fetch_add(1, Ordering::SeqCst);
		let lagging = self
			.stale_recalcs
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if !lagging {
			Self::recompute(&mut self.state.lock());
		}
		Ok(())
	}

	fn has_permission(&self, node: &str) -> bool {
		self.state.lock().effective.allows(node)
	}

	fn set_display_label(&self, label: &DisplayLabel) -> Result<(), HostError> {
		if self.fail_label.load(Ordering::SeqCst) {
			return Err(HostError::Rejected("label refused".into()));
		}
		self.state.lock().label = Some(label.clone());
		Ok(())
	}

	fn reset_display_label(&self) -> Result<(), HostError> {
		self.state.lock().label = None;
		Ok(())
	}
}

/// Host node registry that remembers what was declared.
#[derive(Debug, Default)]
pub struct FakeHost {
	registered: Mutex<HashSet<String>>,
	fail_register: AtomicBool,
}

impl FakeHost {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn fail_register(&self, fail: bool) {
		self.fail_register.store(fail, Ordering::SeqCst);
	}

	pub fn registered(&self) -> Vec<String> {
		let mut nodes: Vec<_> = self.registered.lock().iter().cloned().collect();
		nodes.sort();
		nodes
	}
}

impl PermissionHost for FakeHost {
	fn is_registered(&self, node: &str) -> bool {
		self.registered.lock().contains(node)
	}

	fn register(&self, node: &str) -> Result<(), HostError> {
		if self.fail_register.load(Ordering::SeqCst) {
			return Err(HostError::Rejected(format!("cannot register {node}")));
		}
		self.registered.lock().insert(node.to_string());
		Ok(())
	}
}
