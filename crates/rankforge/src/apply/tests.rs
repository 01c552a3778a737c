use pretty_assertions::assert_eq;

use super::*;
use crate::host::LiveEntity;
use crate::testing::{FakeEntity, FakeHost};

fn vip() -> RankDefinition {
	RankDefinition {
		name: "VIP".into(),
		prefix: "[VIP]".into(),
		suffix: String::new(),
		weight: 50,
		is_default: false,
		permissions: vec!["kit.vip".into(), "-kit.admin".into(), "fly".into()],
	}
}

fn member() -> RankDefinition {
	RankDefinition {
		name: "member".into(),
		prefix: String::new(),
		suffix: String::new(),
		weight: 1,
		is_default: true,
		permissions: vec!["chat.use".into()],
	}
}

struct Fixture {
	host: Arc<FakeHost>,
	applicator: Applicator,
	state: EntityStateStore,
	entity: Arc<FakeEntity>,
	handle: EntityHandle,
}

fn fixture() -> Fixture {
	let host = FakeHost::new();
	let applicator = Applicator::new(host.clone());
	let state = EntityStateStore::new();
	let entity = FakeEntity::random("Steve");
	let handle: EntityHandle = entity.clone();
	{
		let guard = state.lock(entity.id());
		state.on_join(&guard, handle.clone());
	}
	Fixture {
		host,
		applicator,
		state,
		entity,
		handle,
	}
}

#[test]
fn apply_attaches_one_bundle_and_registers_nodes() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	let report = fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());

	assert!(report.is_complete());
	assert_eq!(report.applied, 3);
	assert_eq!(fx.entity.bundle_ids(), vec![report.bundle]);
	assert_eq!(fx.host.registered(), vec!["fly", "kit.admin", "kit.vip"]);
	assert!(fx.entity.has_permission("kit.vip"));
	assert!(!fx.entity.has_permission("kit.admin"));

	let effective = fx.state.effective(fx.entity.id()).expect("grants stored");
	assert_eq!(effective.get("kit.admin"), Some(false));
}

#[test]
fn reapply_replaces_previous_grants() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	let second = fx.applicator.apply(&guard, &fx.state, &fx.handle, &member());

	assert_eq!(fx.entity.bundle_ids(), vec![second.bundle]);
	assert!(!fx.entity.has_permission("kit.vip"));
	assert!(fx.entity.has_permission("chat.use"));
}

#[test]
fn rejected_detach_falls_back_to_clearing() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	fx.entity.fail_detach(true);
	let second = fx.applicator.apply(&guard, &fx.state, &fx.handle, &member());

	assert_eq!(fx.entity.bundle_ids(), vec![second.bundle]);
}

#[test]
fn bad_tokens_are_counted_not_fatal() {
	let fx = fixture();
	let mut rank = vip();
	rank.permissions.extend(["".to_string(), "no spaces".to_string(), "x".repeat(101)]);
	fx.host.fail_register(false);

	let guard = fx.state.lock(fx.entity.id());
	let report = fx.applicator.apply(&guard, &fx.state, &fx.handle, &rank);
	assert!(!report.is_complete());
	assert_eq!(report.applied, 3);
	assert_eq!(report.failed(), 3);
	assert!(fx.entity.has_permission("fly"));
}

#[test]
fn register_failure_skips_only_that_node() {
	let fx = fixture();
	fx.host.fail_register(true);
	let guard = fx.state.lock(fx.entity.id());
	let report = fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	assert_eq!(report.applied, 0);
	assert_eq!(report.unregistered.len(), 3);

	let mut admin = vip();
	admin.permissions = vec!["*".into(), "-server.stop".into()];
	let report = fx.applicator.apply(&guard, &fx.state, &fx.handle, &admin);
	// The wildcard never needs registering.
	assert_eq!(report.applied, 1);
	assert!(fx.entity.has_permission("anything.at.all"));
}

#[test]
fn reconcile_is_a_no_op_when_grants_are_live() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	let bundles = fx.entity.bundle_ids();

	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Settled);
	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Settled);
	assert_eq!(fx.entity.bundle_ids(), bundles);
}

#[test]
fn reconcile_retries_exactly_once_per_bundle() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	fx.entity.lag_recalculations(usize::MAX);
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());

	let retried = fx.applicator.reconcile(&guard, &fx.state, &vip());
	assert!(matches!(retried, ReconcileOutcome::Retried(_)));
	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Failed);
	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Failed);
}

#[test]
fn reconcile_recovers_after_a_lagging_recalculation() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	// The apply's recalculation is lost; the reconcile's is not.
	fx.entity.lag_recalculations(1);
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	assert!(!fx.entity.has_permission("kit.vip"));

	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Settled);
	assert!(fx.entity.has_permission("kit.vip"));
}

#[test]
fn reconcile_skips_entities_without_grants() {
	let fx = fixture();
	let stranger = EntityId::random();
	let guard = fx.state.lock(stranger);
	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &vip()), ReconcileOutcome::Skipped);
}

#[test]
fn refused_attach_keeps_previous_grants() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	let first = fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	fx.entity.fail_attach(true);

	let report = fx.applicator.apply(&guard, &fx.state, &fx.handle, &member());
	assert!(report.host_error.is_some());
	assert_eq!(fx.entity.bundle_ids(), vec![first.bundle]);
	assert!(fx.entity.has_permission("kit.vip"));
	assert!(!fx.entity.has_permission("chat.use"));

	let applied = fx.state.applied(fx.entity.id()).expect("grants kept");
	assert_eq!(applied.bundle, first.bundle);
	assert_eq!(applied.rank, "VIP");
	assert_eq!(applied.pending.as_deref(), Some("member"));
	assert!(applied.effective.allows("kit.vip"));
	assert!(!applied.effective.allows("chat.use"));
}

#[test]
fn refused_attach_is_retried_once_then_abandoned() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	let first = fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	fx.entity.fail_attach(true);
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &member());

	let retried = fx.applicator.reconcile(&guard, &fx.state, &member());
	assert!(matches!(retried, ReconcileOutcome::Retried(ref report) if report.host_error.is_some()));
	assert_eq!(fx.applicator.reconcile(&guard, &fx.state, &member()), ReconcileOutcome::Failed);
	assert_eq!(fx.entity.bundle_ids(), vec![first.bundle]);
	assert!(fx.entity.has_permission("kit.vip"));
}

#[test]
fn reconcile_attaches_a_first_bundle_that_was_refused() {
	let fx = fixture();
	let guard = fx.state.lock(fx.entity.id());
	fx.entity.fail_attach(true);
	fx.applicator.apply(&guard, &fx.state, &fx.handle, &vip());
	assert!(fx.entity.bundle_ids().is_empty());
	assert!(fx.state.effective(fx.entity.id()).is_some_and(|set| !set.allows("kit.vip")));

	fx.entity.fail_attach(false);
	let ReconcileOutcome::Retried(report) = fx.applicator.reconcile(&guard, &fx.state, &vip()) else {
		panic!("a refused attach is retried");
	};
	assert!(report.is_complete());
	assert_eq!(fx.entity.bundle_ids(), vec![report.bundle]);
	assert!(fx.entity.has_permission("kit.vip"));
	assert_eq!(fx.state.applied(fx.entity.id()).and_then(|a| a.pending), None);
}
