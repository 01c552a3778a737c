//! Length-bounded name tag and roster text derived from a rank.

pub mod markup;

use markup::{colorize, strip, take_chars, take_last_chars, visible_len};

use crate::model::RankDefinition;

/// Host limit for each half of a name tag, in characters.
pub const TAG_LIMIT: usize = 16;
/// Plain characters kept when a tag half has to be cut.
pub const TAG_TRUNCATED: usize = TAG_LIMIT - ELLIPSIS.len();
/// Visible character budget for a roster entry.
pub const ROSTER_LIMIT: usize = 40;
pub const ELLIPSIS: &str = "..";
/// Prefix of the ordering group name shared by entities of equal weight.
pub const GROUP_PREFIX: &str = "rank_";
/// Weights above this share the last group.
pub const MAX_GROUP_WEIGHT: u32 = 9999;

/// Text shown around an entity's name above its head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTag {
	pub prefix: String,
	pub suffix: String,
}

/// Everything pushed to the host's display surfaces for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayLabel {
	/// Group the host sorts its roster by. Orders ascending with weight.
	pub group: String,
	/// `None` when name tags are disabled.
	pub tag: Option<NameTag>,
	/// `None` when roster names are disabled.
	pub roster: Option<String>,
}

/// Which surfaces to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationOptions {
	pub nametag: bool,
	pub roster: bool,
}

impl Default for PresentationOptions {
	fn default() -> Self {
		Self {
			nametag: true,
			roster: true,
		}
	}
}

/// Derives the full label for `display_name` holding `rank`.
pub fn format_label(rank: &RankDefinition, display_name: &str, options: PresentationOptions) -> DisplayLabel {
	DisplayLabel {
		group: group_name(rank.weight),
		tag: options.nametag.then(|| format_tag(&rank.prefix, &rank.suffix)),
		roster: options.roster.then(|| format_roster(&rank.prefix, display_name, &rank.suffix)),
	}
}

/// Zero-padded group name for `weight`, so groups sort like weights.
pub fn group_name(weight: u32) -> String {
	format!("{GROUP_PREFIX}{:04}", weight.min(MAX_GROUP_WEIGHT))
}

/// Builds the name tag halves, each within [`TAG_LIMIT`].
pub fn format_tag(prefix: &str, suffix: &str) -> NameTag {
	let prefix = if strip(prefix).is_empty() {
		String::new()
	} else if ends_with_space(prefix) {
		prefix.to_string()
	} else {
		format!("{prefix} ")
	};
	let suffix = if strip(suffix).is_empty() {
		String::new()
	} else if starts_with_space(suffix) {
		suffix.to_string()
	} else {
		format!(" {suffix}")
	};
	NameTag {
		prefix: fit_tag_part(&prefix, TagSide::Leading),
		suffix: fit_tag_part(&suffix, TagSide::Trailing),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagSide {
	Leading,
	Trailing,
}

fn fit_tag_part(text: &str, side: TagSide) -> String {
	let colored = colorize(text);
	if colored.chars().count() <= TAG_LIMIT {
		return colored;
	}
	let plain = strip(&colored);
	if plain.chars().count() <= TAG_LIMIT {
		return plain;
	}
	match side {
		TagSide::Leading => format!("{}{ELLIPSIS}", take_chars(&plain, TAG_TRUNCATED)),
		TagSide::Trailing => format!("{ELLIPSIS}{}", take_last_chars(&plain, TAG_TRUNCATED)),
	}
}

/// Builds the roster entry, within [`ROSTER_LIMIT`] visible characters.
///
/// The name always survives intact unless it alone exceeds the budget. The
/// suffix is shortened first, then the prefix (dropping the suffix).
pub fn format_roster(prefix: &str, name: &str, suffix: &str) -> String {
	let prefix = colorize(prefix);
	let suffix = colorize(suffix);
	let name_len = name.chars().count();
	let (prefix_len, suffix_len) = (visible_len(&prefix), visible_len(&suffix));

	let full_len = prefix_len + gap_after(&prefix) + name_len + gap_before(&suffix) + suffix_len;
	if full_len <= ROSTER_LIMIT {
		return compose(&prefix, name, &suffix);
	}

	// Both gaps are reserved up front.
	let Some(available) = ROSTER_LIMIT.checked_sub(name_len + 2).filter(|n| *n > 0) else {
		return take_chars(name, ROSTER_LIMIT);
	};

	if prefix_len + ELLIPSIS.len() <= available {
		let remaining = available - prefix_len;
		let suffix = if suffix_len <= remaining {
			suffix
		} else if remaining > ELLIPSIS.len() {
			format!("{}{ELLIPSIS}", take_chars(&strip(&suffix), remaining - ELLIPSIS.len()))
		} else {
			String::new()
		};
		return compose(&prefix, name, &suffix);
	}

	if available > 2 * ELLIPSIS.len() {
		let prefix = format!("{}{ELLIPSIS}", take_chars(&strip(&prefix), available - ELLIPSIS.len()));
		return compose(&prefix, name, "");
	}

	name.to_string()
}

fn compose(prefix: &str, name: &str, suffix: &str) -> String {
	let mut out = String::with_capacity(prefix.len() + name.len() + suffix.len() + 2);
	out.push_str(prefix);
	if gap_after(prefix) == 1 {
		out.push(' ');
	}
	out.push_str(name);
	if gap_before(suffix) == 1 {
		out.push(' ');
	}
	out.push_str(suffix);
	out
}

fn ends_with_space(text: &str) -> bool {
	strip(text).ends_with(' ')
}

fn starts_with_space(text: &str) -> bool {
	strip(text).starts_with(' ')
}

fn gap_after(prefix: &str) -> usize {
	let visible = strip(prefix);
	usize::from(!visible.is_empty() && !visible.ends_with(' '))
}

fn gap_before(suffix: &str) -> usize {
	let visible = strip(suffix);
	usize::from(!visible.is_empty() && !visible.starts_with(' '))
}
