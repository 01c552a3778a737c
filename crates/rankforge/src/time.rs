//! Clocks, rank durations and the persisted timestamp format.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use parking_lot::Mutex;
use regex::Regex;

/// Persisted timestamp layout. Sorts lexicographically in time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

static DURATION_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^(\d+)(s|m|h|d|mo|y)$").expect("duration pattern is valid"));

/// Source of the current time. Injected so expiry can be tested.
pub trait Clock: Send + Sync + std::fmt::Debug {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self { now: Mutex::new(start) }
	}

	/// Moves the clock forward.
	pub fn advance(&self, by: Duration) {
		let delta = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
		let mut now = self.now.lock();
		*now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
	}

	pub fn set(&self, at: DateTime<Utc>) {
		*self.now.lock() = at;
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new(Utc::now())
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock()
	}
}

/// How long an assignment lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDuration {
	Permanent,
	For(Duration),
}

impl RankDuration {
	/// Absolute expiry when granted at `given`; `None` means permanent.
	pub fn expiry_from(self, given: DateTime<Utc>) -> Option<DateTime<Utc>> {
		match self {
			Self::Permanent => None,
			Self::For(d) => {
				let delta = TimeDelta::from_std(d).ok()?;
				given.checked_add_signed(delta)
			}
		}
	}

	pub fn is_permanent(self) -> bool {
		matches!(self, Self::Permanent)
	}
}

/// Parses `"30m"`, `"7d"`, `"2mo"`, `"1y"` and friends.
///
/// Empty, zero, `"permanent"`, malformed and overflowing inputs all yield
/// [`RankDuration::Permanent`]. This never fails.
pub fn parse_duration(spec: &str) -> RankDuration {
	let spec = spec.trim().to_ascii_lowercase();
	if spec.is_empty() || spec == "permanent" {
		return RankDuration::Permanent;
	}
	let Some(caps) = DURATION_PATTERN.captures(&spec) else {
		return RankDuration::Permanent;
	};
	let Ok(amount) = caps[1].parse::<u64>() else {
		return RankDuration::Permanent;
	};
	let unit = match &caps[2] {
		"s" => 1,
		"m" => MINUTE,
		"h" => HOUR,
		"d" => DAY,
		"mo" => MONTH,
		"y" => YEAR,
		_ => return RankDuration::Permanent,
	};
	match amount.checked_mul(unit) {
		Some(0) | None => RankDuration::Permanent,
		Some(secs) => RankDuration::For(Duration::from_secs(secs)),
	}
}

/// Returns true when `expires` is set and lies strictly before `now`.
pub fn is_expired(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
	matches!(expires, Some(at) if now > at)
}

/// Drops sub-second precision so a stamp survives a format/parse cycle.
pub fn stamp(at: DateTime<Utc>) -> DateTime<Utc> {
	at.with_nanosecond(0).unwrap_or(at)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
	at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
	NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
		.ok()
		.map(|naive| naive.and_utc())
}

/// Human-readable time left, e.g. `"2d 3h 10m"`, `"Permanent"` or `"Expired"`.
pub fn describe_remaining(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
	let Some(at) = expires else {
		return "Permanent".to_string();
	};
	if now > at {
		return "Expired".to_string();
	}
	let left = (at - now).num_seconds().max(0) as u64;
	let (days, hours, minutes) = (left / DAY, (left % DAY) / HOUR, (left % HOUR) / MINUTE);
	if days > 0 {
		format!("{days}d {hours}h {minutes}m")
	} else if hours > 0 {
		format!("{hours}h {minutes}m")
	} else {
		format!("{minutes}m")
	}
}

/// Human-readable age, e.g. `"3d 4h ago"` or `"12m ago"`.
pub fn describe_since(given: DateTime<Utc>, now: DateTime<Utc>) -> String {
	let age = (now - given).num_seconds().max(0) as u64;
	let (days, hours, minutes) = (age / DAY, (age % DAY) / HOUR, (age % HOUR) / MINUTE);
	if days > 0 {
		format!("{days}d {hours}h ago")
	} else if hours > 0 {
		format!("{hours}h {minutes}m ago")
	} else {
		format!("{minutes}m ago")
	}
}
