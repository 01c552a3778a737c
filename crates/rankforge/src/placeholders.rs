//! Text substitutions exposing an entity's rank to chat and scoreboard
//! templates.

use crate::engine::RankForge;
use crate::model::EntityId;
use crate::presentation::markup::colorize;
use crate::time::{describe_remaining, describe_since, format_timestamp};

const HAS_RANK: &str = "has_rank_";

/// A recognised placeholder key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
	Rank,
	Prefix,
	Suffix,
	Weight,
	/// Time left on the assignment.
	Expiry,
	TimeGiven,
	TimeSinceGiven,
	AllRanks,
	/// Prefix, name and suffix.
	Nametag,
	/// Prefix and name.
	Tabname,
	HasRank(String),
}

impl Placeholder {
	/// Parses a key such as `prefix` or `has_rank_vip`, ignoring case.
	pub fn parse(key: &str) -> Option<Self> {
		let lower = key.to_ascii_lowercase();
		Some(match lower.as_str() {
			"rank" => Self::Rank,
			"prefix" => Self::Prefix,
			"suffix" => Self::Suffix,
			"weight" => Self::Weight,
			"expiry" => Self::Expiry,
			"time_given" => Self::TimeGiven,
			"time_since_given" => Self::TimeSinceGiven,
			"all_ranks" => Self::AllRanks,
			"nametag" => Self::Nametag,
			"tabname" => Self::Tabname,
			other => {
				let rank = other.strip_prefix(HAS_RANK).filter(|r| !r.is_empty())?;
				Self::HasRank(key[key.len() - rank.len()..].to_string())
			}
		})
	}
}

impl RankForge {
	/// Expands `key` for `entity`. Returns `None` for unknown keys.
	pub fn placeholder(&self, entity: EntityId, key: &str) -> Option<String> {
		let placeholder = Placeholder::parse(key)?;
		let record = self.current_record(entity);
		let rank = self.resolve_rank(entity);
		let now = self.now();
		let name = || {
			self.state()
				.handle(entity)
				.map(|h| h.display_name())
				.or_else(|| record.as_ref().map(|r| r.display_name.clone()))
				.unwrap_or_default()
		};

		let value = match placeholder {
			Placeholder::Rank => rank.name.clone(),
			Placeholder::Prefix => colorize(&rank.prefix),
			Placeholder::Suffix => colorize(&rank.suffix),
			Placeholder::Weight => rank.weight.to_string(),
			Placeholder::Expiry => describe_remaining(record.as_ref().and_then(|r| r.time_expires), now),
			Placeholder::TimeGiven => record.as_ref().map_or_else(|| "Unknown".to_string(), |r| format_timestamp(r.time_given)),
			Placeholder::TimeSinceGiven => record
				.as_ref()
				.map_or_else(|| "Unknown".to_string(), |r| describe_since(r.time_given, now)),
			Placeholder::AllRanks => rank.name.clone(),
			Placeholder::Nametag => format!("{}{}{}", colorize(&rank.prefix), name(), colorize(&rank.suffix)),
			Placeholder::Tabname => format!("{}{}", colorize(&rank.prefix), name()),
			Placeholder::HasRank(wanted) => rank.is_named(&wanted).to_string(),
		};
		Some(value)
	}
}
