use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use pretty_assertions::assert_eq;
use rankforge::storage::StorageOp;
use rankforge::testing::FakeEntity;
use rankforge::{DefaultReason, EntityId, JoinOutcome, LiveEntity, MemoryStorage, PlayerRankRecord};
use rankforge_worker::DrainBudget;

use crate::common::{clock, engine};

fn stored(entity: EntityId, rank: &str, expires_in: Option<TimeDelta>, now: chrono::DateTime<chrono::Utc>) -> PlayerRankRecord {
	PlayerRankRecord {
		entity_id: entity,
		display_name: "Stored".into(),
		rank_name: rank.into(),
		time_given: now,
		time_expires: expires_in.map(|d| now + d),
	}
}

#[tokio::test]
async fn vip_assignment_end_to_end() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let steve = FakeEntity::random("Steve");
	engine.join(steve.clone()).await.expect("real id");

	let vip = engine.find_rank("VIP").expect("VIP is defined");
	assert_eq!(vip.weight, 50);
	assert_eq!(vip.prefix, "[VIP]");
	let lower = engine.find_rank("vip").expect("lookup ignores case");
	assert!(Arc::ptr_eq(&vip, &lower));
	assert!(engine.list_ranks().iter().any(|r| r.name == "VIP"));
	assert_eq!(
		engine.list_ranks_sorted().iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
		vec!["admin", "VIP", "member"]
	);

	let record = engine.set_rank(steve.id(), "Steve", "VIP", "permanent").expect("VIP exists");
	assert_eq!(record.rank_name, "VIP");
	assert_eq!(record.time_expires, None);
	assert!(Arc::ptr_eq(&engine.resolve_rank(steve.id()), &vip));
	assert!(engine.has_rank(steve.id(), "vip"));
	assert!(steve.has_permission("kit.vip"));

	let label = steve.label().expect("label pushed");
	assert_eq!(label.group, "rank_0050");
	assert_eq!(label.roster.as_deref(), Some("[VIP] Steve \u{a7}6*"));

	// Force the cached expiry into the past.
	{
		let state = engine.state();
		let guard = state.lock(steve.id());
		let past = engine.now() - TimeDelta::seconds(1);
		state.put_record(
			&guard,
			PlayerRankRecord {
				time_expires: Some(past),
				..record
			},
		);
	}
	let resolved = engine.resolve_rank(steve.id());
	assert_eq!(resolved.name, "member");
	assert!(resolved.is_default);
	assert!(!steve.has_permission("kit.vip"));
	assert!(steve.has_permission("chat.use"));

	assert!(engine.settle(DrainBudget::new(Duration::from_secs(2))).await.is_settled());
	assert_eq!(storage.get(steve.id()), None);
}

#[tokio::test]
async fn quit_during_load_supersedes_the_join() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let steve = FakeEntity::random("Steve");
	storage.insert(stored(steve.id(), "VIP", None, engine.now()));
	storage.set_fetch_delay(Some(Duration::from_millis(100)));

	let joining = tokio::spawn({
		let engine = engine.clone();
		let handle = steve.clone();
		async move { engine.join(handle).await }
	});
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(engine.state().is_connected(steve.id()));
	assert!(engine.quit(steve.id()));

	let outcome = joining.await.expect("join task").expect("real id");
	assert_eq!(outcome, JoinOutcome::Superseded);
	assert!(!engine.state().is_connected(steve.id()));
	assert!(steve.bundle_ids().is_empty());
	assert_eq!(steve.label(), None);
	assert_eq!(steve.recalculations(), 0);
}

#[tokio::test]
async fn rejoin_during_load_keeps_only_the_newest_session() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let steve = FakeEntity::random("Steve");
	storage.insert(stored(steve.id(), "admin", None, engine.now()));
	storage.set_fetch_delay(Some(Duration::from_millis(50)));

	let first = tokio::spawn({
		let engine = engine.clone();
		let handle = steve.clone();
		async move { engine.join(handle).await }
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	let second = engine.join(steve.clone()).await.expect("real id");

	assert_eq!(first.await.expect("join task").expect("real id"), JoinOutcome::Superseded);
	assert!(matches!(second, JoinOutcome::Resolved { ref rank, fallback: None, .. } if rank == "admin"));
	assert_eq!(steve.bundle_ids().len(), 1);
}

#[tokio::test]
async fn storage_failure_falls_back_to_default() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let steve = FakeEntity::random("Steve");
	storage.insert(stored(steve.id(), "VIP", None, engine.now()));
	storage.fail_fetch(true);

	let outcome = engine.join(steve.clone()).await.expect("real id");
	assert_eq!(
		outcome,
		JoinOutcome::Resolved {
			rank: "member".into(),
			expires: None,
			fallback: Some(DefaultReason::StorageFailed),
		}
	);
	assert!(steve.has_permission("chat.use"));
	assert!(engine.flush().await);
	assert!(storage.get(steve.id()).is_some(), "a failed fetch never deletes");
}

#[tokio::test]
async fn stale_or_dangling_records_fall_back_on_join() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let now = engine.now();
	let (expired, dangling) = (FakeEntity::random("Old"), FakeEntity::random("Lost"));
	storage.insert(stored(expired.id(), "VIP", Some(TimeDelta::seconds(-60)), now));
	storage.insert(stored(dangling.id(), "ghost", None, now));

	let outcome = engine.join(expired.clone()).await.expect("real id");
	assert!(matches!(outcome, JoinOutcome::Resolved { fallback: Some(DefaultReason::Expired), .. }));
	let outcome = engine.join(dangling.clone()).await.expect("real id");
	assert!(matches!(
		outcome,
		JoinOutcome::Resolved { fallback: Some(DefaultReason::UnknownRank(ref name)), .. } if name == "ghost"
	));

	assert!(engine.flush().await);
	assert_eq!(storage.history(), vec![StorageOp::Delete(expired.id())]);
	assert!(storage.get(dangling.id()).is_some(), "unknown ranks are kept for a later reload");
}

#[tokio::test]
async fn lagging_host_is_retried_once() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage, clock());
	let steve = FakeEntity::random("Steve");
	steve.lag_recalculations(1);

	engine.join(steve.clone()).await.expect("real id");
	assert!(!steve.has_permission("chat.use"));

	assert!(engine.settle(DrainBudget::new(Duration::from_secs(2))).await.is_settled());
	assert!(steve.has_permission("chat.use"));
}

#[tokio::test]
async fn set_while_offline_is_picked_up_on_join() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage, clock());
	let steve = FakeEntity::random("Steve");
	engine.set_rank(steve.id(), "Steve", "admin", "7d").expect("admin exists");

	let outcome = engine.join(steve.clone()).await.expect("real id");
	assert!(matches!(outcome, JoinOutcome::Resolved { ref rank, expires: Some(_), fallback: None } if rank == "admin"));
	assert!(steve.has_permission("world.edit"));
	assert!(!steve.has_permission("server.stop"));
	assert_eq!(engine.placeholder(steve.id(), "expiry").as_deref(), Some("7d 0h 0m"));
}

#[tokio::test]
async fn shutdown_settles_pending_writes() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	for name in ["a", "b", "c"] {
		engine.set_rank(EntityId::random(), name, "vip", "30d").expect("VIP exists");
	}
	let report = engine.shutdown(DrainBudget::new(Duration::from_secs(2))).await;
	assert!(report.is_settled());
	assert_eq!(storage.len(), 3);
}
