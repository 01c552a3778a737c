//! Who may hand out which rank.

use crate::model::{EntityId, RankDefinition};

/// Node that lifts the weight restriction for an entity.
pub const BYPASS_PERMISSION: &str = "rankforge.set.bypass";

/// Whoever issued a rank command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
	/// The server itself. Never restricted.
	Console,
	Entity(EntityId),
}

/// Whether an actor holding `actor_weight` may assign `target`.
///
/// `None` stands for a non-entity actor. Entities may only assign ranks
/// strictly below their own weight unless `bypass` is set.
pub fn may_assign(actor_weight: Option<u32>, target: &RankDefinition, bypass: bool) -> bool {
	match actor_weight {
		None => true,
		Some(_) if bypass => true,
		Some(weight) => weight > target.weight,
	}
}
