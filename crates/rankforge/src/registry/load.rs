//! Rank source parsing and validation.
//!
//! A source is a TOML document with one `[ranks.<name>]` table per rank.
//! Loading never fails as a whole: each bad entry is skipped and recorded in
//! the returned [`RankLoadReport`].

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashSet as HashSet;
use serde::Deserialize;

use super::table::{DefaultResolution, RankTable};
use crate::error::RankLoadError;
use crate::model::RankDefinition;
use crate::permission::PermissionToken;

static RANK_NAME: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,32}$").expect("rank name pattern is valid"));

#[derive(Debug, Default, Deserialize)]
struct RawSource {
	#[serde(default)]
	ranks: Option<IndexMap<String, toml::Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRank {
	prefix: Option<String>,
	suffix: Option<String>,
	weight: Option<i64>,
	default: bool,
	permissions: Vec<toml::Value>,
}

/// Aggregate result of loading one rank source.
#[derive(Debug)]
pub struct RankLoadReport {
	pub table: RankTable,
	pub default: DefaultResolution,
	/// Entries that were skipped or repaired.
	pub errors: Vec<RankLoadError>,
}

/// Returns true when `name` is a usable rank name.
pub fn is_valid_rank_name(name: &str) -> bool {
	RANK_NAME.is_match(name)
}

/// Parses and validates a rank source.
pub fn load_rank_table(source: &str) -> RankLoadReport {
	let mut errors = Vec::new();
	let raw: RawSource = match toml::from_str(source) {
		Ok(raw) => raw,
		Err(e) => {
			errors.push(RankLoadError::Parse(e.to_string()));
			RawSource::default()
		}
	};
	let entries = match raw.ranks {
		Some(entries) => entries,
		None => {
			if errors.is_empty() {
				errors.push(RankLoadError::MissingRanks);
			}
			IndexMap::new()
		}
	};

	let mut seen = HashSet::default();
	let mut ranks = Vec::with_capacity(entries.len());
	for (name, value) in entries {
		if !is_valid_rank_name(&name) {
			errors.push(RankLoadError::InvalidName(name));
			continue;
		}
		if !seen.insert(name.to_ascii_lowercase()) {
			errors.push(RankLoadError::DuplicateName(name));
			continue;
		}
		let raw: RawRank = match value.try_into() {
			Ok(raw) => raw,
			Err(e) => {
				errors.push(RankLoadError::InvalidEntry {
					rank: name,
					reason: e.to_string(),
				});
				continue;
			}
		};
		ranks.push(validate_rank(name, raw, &mut errors));
	}

	let (table, default) = RankTable::build(ranks);
	report_load(&table, &default, &errors);
	RankLoadReport { table, default, errors }
}

fn validate_rank(name: String, raw: RawRank, errors: &mut Vec<RankLoadError>) -> RankDefinition {
	let weight = raw.weight.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
	let permissions = validate_permissions(&name, raw.permissions, errors);
	tracing::debug!(rank = %name, weight, default = raw.default, permissions = permissions.len(), "rank.loaded");
	RankDefinition {
		prefix: raw.prefix.map(|s| s.trim().to_string()).unwrap_or_default(),
		suffix: raw.suffix.map(|s| s.trim().to_string()).unwrap_or_default(),
		weight,
		is_default: raw.default,
		permissions,
		name,
	}
}

/// Keeps well-formed tokens in order, normalised and deduplicated
/// case-insensitively.
fn validate_permissions(rank: &str, raw: Vec<toml::Value>, errors: &mut Vec<RankLoadError>) -> Vec<String> {
	let mut seen = HashSet::default();
	let mut valid = Vec::with_capacity(raw.len());
	for value in raw {
		let Some(text) = value.as_str() else {
			errors.push(RankLoadError::InvalidPermission {
				rank: rank.to_string(),
				token: value.to_string(),
			});
			continue;
		};
		let text = text.trim();
		if text.is_empty() {
			continue;
		}
		let Some(token) = PermissionToken::parse(text) else {
			errors.push(RankLoadError::InvalidPermission {
				rank: rank.to_string(),
				token: text.to_string(),
			});
			continue;
		};
		let normalised = if token.value { token.node } else { format!("-{}", token.node) };
		if !seen.insert(normalised.to_ascii_lowercase()) {
			errors.push(RankLoadError::DuplicatePermission {
				rank: rank.to_string(),
				token: text.to_string(),
			});
			continue;
		}
		valid.push(normalised);
	}
	valid
}

fn report_load(table: &RankTable, default: &DefaultResolution, errors: &[RankLoadError]) {
	for error in errors {
		tracing::warn!(error = %error, "rank.load_error");
	}
	match default {
		DefaultResolution::Configured(_) => {}
		DefaultResolution::Multiple { kept, demoted } => {
			tracing::warn!(kept = %kept, demoted = ?demoted, "multiple default ranks configured");
		}
		DefaultResolution::Promoted(name) => {
			tracing::warn!(rank = %name, "no rank marked default; promoted rank named 'default'");
		}
		DefaultResolution::Synthesized => {
			tracing::warn!("no default rank configured; created an emergency default rank");
		}
	}
	for (weight, names) in table.weight_collisions() {
		tracing::warn!(weight, ranks = ?names, "multiple ranks share a weight");
	}
	tracing::info!(
		ranks = table.len(),
		default = %table.default_rank().name,
		skipped = errors.len(),
		"loaded rank table"
	);
}
