//! Legacy `&`-code markup: translation to section-sign codes and visible
//! width measurement.
//!
//! Recognised sequences are `&c`/`§c` for the classic colour and style codes
//! and `&#RRGGBB` for hex colours.

const SECTION: char = '§';

fn is_code(c: char) -> bool {
	matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r' | 'x')
}

fn hex_run(chars: &[char]) -> Option<&[char]> {
	let run = chars.get(..6)?;
	run.iter().all(char::is_ascii_hexdigit).then_some(run)
}

/// Translates `&` codes into the `§` form the host renders.
pub fn colorize(text: &str) -> String {
	let chars: Vec<char> = text.chars().collect();
	let mut out = String::with_capacity(text.len());
	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		if c == '&' {
			if chars.get(i + 1) == Some(&'#')
				&& let Some(hex) = hex_run(&chars[i + 2..])
			{
				out.push(SECTION);
				out.push('x');
				for h in hex {
					out.push(SECTION);
					out.push(h.to_ascii_lowercase());
				}
				i += 8;
				continue;
			}
			if let Some(&code) = chars.get(i + 1)
				&& is_code(code)
			{
				out.push(SECTION);
				out.push(code.to_ascii_lowercase());
				i += 2;
				continue;
			}
		}
		out.push(c);
		i += 1;
	}
	out
}

/// Removes every markup sequence, leaving only visible text.
pub fn strip(text: &str) -> String {
	let chars: Vec<char> = text.chars().collect();
	let mut out = String::with_capacity(text.len());
	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		if c == '&' && chars.get(i + 1) == Some(&'#') && hex_run(&chars[i + 2..]).is_some() {
			i += 8;
			continue;
		}
		if (c == '&' || c == SECTION)
			&& let Some(&code) = chars.get(i + 1)
			&& is_code(code)
		{
			i += 2;
			continue;
		}
		out.push(c);
		i += 1;
	}
	out
}

/// Number of characters a reader actually sees.
pub fn visible_len(text: &str) -> usize {
	strip(text).chars().count()
}

/// First `n` characters of `text`.
pub fn take_chars(text: &str, n: usize) -> String {
	text.chars().take(n).collect()
}

/// Last `n` characters of `text`.
pub fn take_last_chars(text: &str, n: usize) -> String {
	let len = text.chars().count();
	text.chars().skip(len.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn colorize_translates_codes() {
		assert_eq!(colorize("&6[VIP]&r"), "§6[VIP]§r");
		assert_eq!(colorize("&#FFaa00Gold"), "§x§f§f§a§a§0§0Gold");
		assert_eq!(colorize("rock & roll"), "rock & roll");
	}

	#[test]
	fn strip_removes_both_forms() {
		assert_eq!(strip("&6[VIP] §lBold&r"), "[VIP] Bold");
		assert_eq!(strip(&colorize("&#123456hex")), "hex");
		assert_eq!(strip("&#12345"), "&#12345");
		assert_eq!(strip("fish & chips"), "fish & chips");
		assert_eq!(visible_len("&a&lHi"), 2);
	}

	#[test]
	fn char_slicing_respects_multibyte_text() {
		assert_eq!(take_chars("ünïcødé", 3), "ünï");
		assert_eq!(take_last_chars("ünïcødé", 2), "dé");
		assert_eq!(take_last_chars("ab", 5), "ab");
	}
}
