//! Signed permission tokens and the effective grant set built from them.

use std::collections::BTreeMap;

/// The wildcard node. Grants everything not explicitly denied.
pub const WILDCARD: &str = "*";

/// Longest accepted node, excluding the leading `-` of a denial.
pub const MAX_NODE_LEN: usize = 100;

/// A parsed token: the node it names and whether it grants or denies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionToken {
	pub node: String,
	pub value: bool,
}

impl PermissionToken {
	/// Parses `node`, `-node` or `*`, trimming surrounding whitespace.
	///
	/// Returns `None` for empty or malformed tokens.
	pub fn parse(raw: &str) -> Option<Self> {
		let raw = raw.trim();
		let (node, value) = match raw.strip_prefix('-') {
			Some(rest) => (rest.trim(), false),
			None => (raw, true),
		};
		is_valid_node(node).then(|| Self {
			node: node.to_string(),
			value,
		})
	}

	pub fn is_wildcard(&self) -> bool {
		self.node == WILDCARD
	}
}

/// Whether `node` (already stripped of any `-`) is acceptable.
pub fn is_valid_node(node: &str) -> bool {
	if node == WILDCARD {
		return true;
	}
	!node.is_empty()
		&& node.len() <= MAX_NODE_LEN
		&& !node.starts_with('.')
		&& !node.ends_with('.')
		&& node
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'*' | b'-'))
}

/// Node → value map as last pushed to an entity.
///
/// An explicit entry always decides a query, so a denial beats a wildcard
/// grant. Without an explicit entry, a granted wildcard allows the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePermissions {
	entries: BTreeMap<String, bool>,
}

impl EffectivePermissions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a decision. Later calls for the same node win.
	pub fn set(&mut self, node: impl Into<String>, value: bool) {
		self.entries.insert(node.into(), value);
	}

	/// Explicit decision for `node`, if any.
	pub fn get(&self, node: &str) -> Option<bool> {
		self.entries.get(node).copied()
	}

	/// Resolves a permission query.
	pub fn allows(&self, node: &str) -> bool {
		if let Some(value) = self.get(node) {
			return value;
		}
		self.get(WILDCARD).unwrap_or(false)
	}

	/// Nodes set to `true`, in sorted order.
	pub fn granted(&self) -> impl Iterator<Item = &str> {
		self.entries.iter().filter(|(_, v)| **v).map(|(k, _)| k.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), *v))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl FromIterator<PermissionToken> for EffectivePermissions {
	fn from_iter<I: IntoIterator<Item = PermissionToken>>(iter: I) -> Self {
		let mut set = Self::new();
		for token in iter {
			set.set(token.node, token.value);
		}
		set
	}
}
