//! Pushes a rank's permission tokens to a live entity.
//!
//! Every apply fully replaces what was attached before, except when the host
//! refuses the new bundle: the previous one then stays in force until the
//! reconcile retry. Host failures are collected into an [`ApplyReport`];
//! nothing here panics or aborts halfway without saying so.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::HostError;
use crate::host::{BundleId, EntityHandle, PermissionBundle, PermissionHost};
use crate::locks::EntityGuard;
use crate::model::{EntityId, RankDefinition};
use crate::permission::{EffectivePermissions, PermissionToken};
use crate::state::{AppliedGrants, EntityStateStore};

/// Outcome of one apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
	pub entity: EntityId,
	pub rank: String,
	pub bundle: BundleId,
	/// Tokens set on the bundle.
	pub applied: usize,
	/// Tokens that were empty or malformed.
	pub skipped: Vec<String>,
	/// Nodes the host refused to register.
	pub unregistered: Vec<(String, HostError)>,
	/// Attach or recalculation failure, if any.
	pub host_error: Option<HostError>,
}

impl ApplyReport {
	/// Whether every token reached the entity.
	pub fn is_complete(&self) -> bool {
		self.skipped.is_empty() && self.unregistered.is_empty() && self.host_error.is_none()
	}

	/// Number of tokens that did not make it onto the bundle.
	pub fn failed(&self) -> usize {
		self.skipped.len() + self.unregistered.len()
	}
}

/// What a reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
	/// The host reflects the applied grants.
	Settled,
	/// Grants were missing, so the apply was run a second time.
	Retried(ApplyReport),
	/// Grants are still missing after the one retry.
	Failed,
	/// The entity has no session or nothing applied.
	Skipped,
}

/// Builds and attaches permission bundles.
#[derive(Clone)]
pub struct Applicator {
	host: Arc<dyn PermissionHost>,
	next_bundle: Arc<AtomicU64>,
}

impl std::fmt::Debug for Applicator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Applicator")
			.field("next_bundle", &self.next_bundle.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl Applicator {
	pub fn new(host: Arc<dyn PermissionHost>) -> Self {
		Self {
			host,
			next_bundle: Arc::new(AtomicU64::new(1)),
		}
	}

	fn allocate(&self) -> BundleId {
		BundleId::new(self.next_bundle.fetch_add(1, Ordering::Relaxed))
	}

	/// Replaces the entity's grants with those of `rank` and recalculates.
	pub fn apply(
		&self,
		guard: &EntityGuard<'_>,
		state: &EntityStateStore,
		handle: &EntityHandle,
		rank: &RankDefinition,
	) -> ApplyReport {
		let entity = handle.id();
		let mut bundle = PermissionBundle::new(self.allocate());
		let mut effective = EffectivePermissions::new();
		let mut skipped = Vec::new();
		let mut unregistered = Vec::new();

		for raw in &rank.permissions {
			let Some(token) = PermissionToken::parse(raw) else {
				tracing::debug!(entity = %entity, rank = %rank.name, token = %raw, "apply.token_skipped");
				skipped.push(raw.clone());
				continue;
			};
			if !token.is_wildcard() && !self.host.is_registered(&token.node) {
				if let Err(error) = self.host.register(&token.node) {
					tracing::warn!(entity = %entity, node = %token.node, %error, "apply.register_failed");
					unregistered.push((token.node, error));
					continue;
				}
				tracing::trace!(node = %token.node, "apply.node_registered");
			}
			bundle.set(&token.node, token.value);
			effective.set(token.node, token.value);
		}

		let mut host_error = handle.attach_bundle(&bundle).err();
		let grants = match &host_error {
			None => {
				detach_previous(guard, state, handle, &bundle);
				AppliedGrants::new(bundle.id(), &rank.name, effective)
			}
			Some(error) => {
				tracing::error!(entity = %entity, rank = %rank.name, %error, "apply.attach_failed");
				// The previous bundle stays attached and in force.
				let mut kept = state
					.take_applied(guard, entity)
					.unwrap_or_else(|| AppliedGrants::new(bundle.id(), &rank.name, EffectivePermissions::new()));
				kept.pending = Some(rank.name.clone());
				kept.retried = false;
				kept
			}
		};
		if let Err(error) = handle.recalculate() {
			tracing::warn!(entity = %entity, %error, "apply.recalculate_failed");
			host_error.get_or_insert(error);
		}

		let report = ApplyReport {
			entity,
			rank: rank.name.clone(),
			bundle: bundle.id(),
			applied: bundle.len(),
			skipped,
			unregistered,
			host_error,
		};
		state.set_applied(guard, entity, grants);

		if report.is_complete() {
			tracing::debug!(entity = %entity, rank = %rank.name, bundle = %report.bundle, applied = report.applied, "apply.done");
		} else {
			tracing::warn!(
				entity = %entity,
				rank = %rank.name,
				applied = report.applied,
				failed = report.failed(),
				host_error = ?report.host_error,
				"apply.partial"
			);
		}
		report
	}

	/// Checks that the host reflects the last apply, retrying it at most once.
	///
	/// `rank` is the definition to re-apply if a retry is needed.
	pub fn reconcile(&self, guard: &EntityGuard<'_>, state: &EntityStateStore, rank: &RankDefinition) -> ReconcileOutcome {
		let entity = guard.entity();
		let (Some(handle), Some(applied)) = (state.handle(entity), state.applied(entity)) else {
			return ReconcileOutcome::Skipped;
		};
		if let Err(error) = handle.recalculate() {
			tracing::debug!(entity = %entity, %error, "reconcile.recalculate_failed");
		}

		if let Some(pending) = &applied.pending {
			if applied.retried {
				tracing::error!(entity = %entity, rank = %pending, kept = %applied.rank, "reconcile.attach_abandoned");
				return ReconcileOutcome::Failed;
			}
			tracing::warn!(entity = %entity, rank = %rank.name, "reconcile.reattaching");
			let report = self.apply(guard, state, &handle, rank);
			state.mark_retried(guard, entity);
			return ReconcileOutcome::Retried(report);
		}

		let mut intended = applied.effective.granted().peekable();
		if intended.peek().is_none() {
			return ReconcileOutcome::Settled;
		}
		if intended.any(|node| handle.has_permission(node)) {
			return ReconcileOutcome::Settled;
		}

		if applied.retried {
			tracing::error!(entity = %entity, rank = %applied.rank, bundle = %applied.bundle, "reconcile.still_missing");
			return ReconcileOutcome::Failed;
		}

		tracing::warn!(entity = %entity, rank = %rank.name, "reconcile.retrying");
		let report = self.apply(guard, state, &handle, rank);
		state.mark_retried(guard, entity);
		ReconcileOutcome::Retried(report)
	}
}

/// Drops the bundle from the previous apply once `current` is attached.
///
/// If the host refuses the targeted detach, everything is cleared and
/// `current` attached again.
fn detach_previous(guard: &EntityGuard<'_>, state: &EntityStateStore, handle: &EntityHandle, current: &PermissionBundle) {
	let entity = handle.id();
	let Some(previous) = state.take_applied(guard, entity) else {
		return;
	};
	let Err(error) = handle.detach_bundle(previous.bundle) else {
		return;
	};
	tracing::warn!(entity = %entity, bundle = %previous.bundle, %error, "apply.detach_failed");
	let cleared = handle.clear_bundles().and_then(|()| handle.attach_bundle(current));
	if let Err(error) = cleared {
		tracing::error!(entity = %entity, %error, "apply.clear_failed");
	}
}

#[cfg(test)]
mod tests;
