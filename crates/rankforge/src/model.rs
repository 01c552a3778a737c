//! Core data types: entity ids, rank definitions and assignment records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::is_expired;

/// Stable identifier of a connected (or previously seen) entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
	pub const fn new(id: Uuid) -> Self {
		Self(id)
	}

	/// Fresh random id.
	pub fn random() -> Self {
		Self(Uuid::new_v4())
	}

	/// The nil id stands for "no entity" and is refused by mutating calls.
	pub const fn nil() -> Self {
		Self(Uuid::nil())
	}

	pub fn is_nil(&self) -> bool {
		self.0.is_nil()
	}

	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl From<Uuid> for EntityId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl std::str::FromStr for EntityId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// One validated rank. Immutable once it is part of a [`crate::RankTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankDefinition {
	pub name: String,
	pub prefix: String,
	pub suffix: String,
	/// Always at least 1. Higher outranks lower.
	pub weight: u32,
	pub is_default: bool,
	/// Signed tokens in source order: `perm.node`, `-perm.node` or `*`.
	pub permissions: Vec<String>,
}

impl RankDefinition {
	/// Case-insensitive table key.
	pub fn key(&self) -> String {
		self.name.to_ascii_lowercase()
	}

	/// Whether this rank is named `name`, ignoring ASCII case.
	pub fn is_named(&self, name: &str) -> bool {
		self.name.eq_ignore_ascii_case(name)
	}
}

/// The binding of one entity to one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRankRecord {
	pub entity_id: EntityId,
	/// Last known display name.
	pub display_name: String,
	/// May name a rank that has since been deleted from the table.
	pub rank_name: String,
	pub time_given: DateTime<Utc>,
	/// `None` means permanent.
	pub time_expires: Option<DateTime<Utc>>,
}

impl PlayerRankRecord {
	pub fn is_permanent(&self) -> bool {
		self.time_expires.is_none()
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		is_expired(self.time_expires, now)
	}
}
