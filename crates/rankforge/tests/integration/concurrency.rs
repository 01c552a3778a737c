use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rankforge::presentation::group_name;
use rankforge::testing::FakeEntity;
use rankforge::{LiveEntity, MemoryStorage};
use rankforge_worker::DrainBudget;

use crate::common::{clock, engine};

const ROUNDS: usize = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_sets_and_removes_never_mix_ranks() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage.clone(), clock());
	let steve = FakeEntity::random("Steve");
	engine.join(steve.clone()).await.expect("real id");
	let id = steve.id();

	thread::scope(|scope| {
		for worker in 0..4 {
			let engine = &engine;
			scope.spawn(move || {
				for round in 0..ROUNDS {
					match (worker + round) % 3 {
						0 => {
							engine.set_rank(id, "Steve", "vip", "permanent").expect("VIP exists");
						}
						1 => {
							engine.set_rank(id, "Steve", "admin", "1d").expect("admin exists");
						}
						_ => {
							engine.remove_rank(id).expect("real id");
						}
					}
					let rank = engine.resolve_rank(id);
					assert!(["member", "VIP", "admin"].contains(&rank.name.as_str()));
				}
			});
		}
	});

	assert!(engine.settle(DrainBudget::new(Duration::from_secs(5))).await.is_settled());

	let rank = engine.resolve_rank(id);
	let record = engine.current_record(id).expect("connected entities always hold a record");
	assert!(rank.is_named(&record.rank_name));
	let applied = engine.state().applied(id).expect("grants were applied");
	assert_eq!(applied.rank, rank.name);
	assert_eq!(steve.bundle_ids(), vec![applied.bundle]);
	assert_eq!(steve.label().map(|l| l.group), Some(group_name(rank.weight)));
	for token in &rank.permissions {
		if let Some(node) = token.strip_prefix('-') {
			assert!(!steve.has_permission(node), "{node} should be denied under {}", rank.name);
		} else if token != "*" {
			assert!(steve.has_permission(token), "{token} should be granted under {}", rank.name);
		}
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn joins_of_many_entities_are_independent() {
	let storage = Arc::new(MemoryStorage::new());
	let engine = engine(storage, clock());
	let entities: Vec<_> = (0..32).map(|i| FakeEntity::random(format!("player{i}"))).collect();
	for (i, entity) in entities.iter().enumerate() {
		if i % 2 == 0 {
			engine.set_rank(entity.id(), &entity.display_name(), "vip", "permanent").expect("VIP exists");
		}
	}

	let joins: Vec<_> = entities
		.iter()
		.map(|entity| {
			let engine = engine.clone();
			let handle = entity.clone();
			tokio::spawn(async move { engine.join(handle).await })
		})
		.collect();
	for join in joins {
		join.await.expect("join task").expect("real id");
	}

	assert_eq!(engine.state().connected().len(), entities.len());
	let stats = engine.rank_statistics();
	assert_eq!(stats.get("VIP"), Some(&16));
	assert_eq!(stats.get("member"), Some(&16));
	for (i, entity) in entities.iter().enumerate() {
		assert_eq!(entity.has_permission("kit.vip"), i % 2 == 0, "{}", entity.display_name());
	}
}
