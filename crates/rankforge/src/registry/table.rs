use std::sync::Arc;

use rustc_hash::FxHashMap as HashMap;

use crate::model::RankDefinition;

/// Name of the rank injected when a source marks nothing as default.
pub const SYNTHETIC_DEFAULT_NAME: &str = "default";

/// How the default rank of a table was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultResolution {
	/// Exactly one rank was marked default.
	Configured(String),
	/// Several were marked; `kept` won and the others were demoted.
	Multiple { kept: String, demoted: Vec<String> },
	/// None was marked, but a rank named `default` existed and was promoted.
	Promoted(String),
	/// None was marked, so a synthetic `default` rank was added.
	Synthesized,
}

impl DefaultResolution {
	pub fn is_anomaly(&self) -> bool {
		!matches!(self, Self::Configured(_))
	}
}

/// Immutable, validated rank table.
///
/// Always holds exactly one rank with `is_default` set.
#[derive(Debug, Clone)]
pub struct RankTable {
	by_key: HashMap<String, Arc<RankDefinition>>,
	order: Vec<Arc<RankDefinition>>,
	default_key: String,
}

impl RankTable {
	/// Builds a table from already validated, uniquely named ranks, repairing
	/// the default marker so exactly one rank carries it.
	pub fn build(mut ranks: Vec<RankDefinition>) -> (Self, DefaultResolution) {
		let marked: Vec<usize> = ranks.iter().enumerate().filter(|(_, r)| r.is_default).map(|(i, _)| i).collect();

		let (default_idx, resolution) = match marked.as_slice() {
			[only] => (*only, DefaultResolution::Configured(ranks[*only].name.clone())),
			[first, rest @ ..] => {
				let demoted = rest.iter().map(|&i| ranks[i].name.clone()).collect();
				for &i in rest {
					ranks[i].is_default = false;
				}
				(
					*first,
					DefaultResolution::Multiple {
						kept: ranks[*first].name.clone(),
						demoted,
					},
				)
			}
			[] => match ranks.iter().position(|r| r.is_named(SYNTHETIC_DEFAULT_NAME)) {
				Some(i) => {
					ranks[i].is_default = true;
					(i, DefaultResolution::Promoted(ranks[i].name.clone()))
				}
				None => {
					ranks.push(synthetic_default());
					(ranks.len() - 1, DefaultResolution::Synthesized)
				}
			},
		};

		let default_key = ranks[default_idx].key();
		let order: Vec<Arc<RankDefinition>> = ranks.into_iter().map(Arc::new).collect();
		let by_key = order.iter().map(|r| (r.key(), Arc::clone(r))).collect();
		(
			Self {
				by_key,
				order,
				default_key,
			},
			resolution,
		)
	}

	/// A table holding only the synthetic default rank.
	pub fn fallback() -> Self {
		Self::build(Vec::new()).0
	}

	/// Case-insensitive lookup.
	pub fn get(&self, name: &str) -> Option<&Arc<RankDefinition>> {
		self.by_key.get(&name.to_ascii_lowercase())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	pub fn default_rank(&self) -> &Arc<RankDefinition> {
		&self.by_key[&self.default_key]
	}

	/// Ranks in source order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<RankDefinition>> {
		self.order.iter()
	}

	/// Ranks by descending weight, ties kept in source order.
	pub fn sorted_by_weight(&self) -> Vec<Arc<RankDefinition>> {
		let mut ranks = self.order.clone();
		ranks.sort_by(|a, b| b.weight.cmp(&a.weight));
		ranks
	}

	/// Groups of rank names sharing a weight, for load-time warnings.
	pub fn weight_collisions(&self) -> Vec<(u32, Vec<String>)> {
		let mut groups: Vec<(u32, Vec<String>)> = Vec::new();
		for rank in &self.order {
			match groups.iter_mut().find(|(w, _)| *w == rank.weight) {
				Some((_, names)) => names.push(rank.name.clone()),
				None => groups.push((rank.weight, vec![rank.name.clone()])),
			}
		}
		groups.retain(|(_, names)| names.len() > 1);
		groups.sort_by(|a, b| b.0.cmp(&a.0));
		groups
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

fn synthetic_default() -> RankDefinition {
	RankDefinition {
		name: SYNTHETIC_DEFAULT_NAME.to_string(),
		prefix: "&7[Default]".to_string(),
		suffix: String::new(),
		weight: 1,
		is_default: true,
		permissions: Vec::new(),
	}
}
