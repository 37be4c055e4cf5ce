use std::fmt;

use serde_json::Value;

/// A configured point in time, in milliseconds from timer-zero, at which an
/// alert should fire.
///
/// Equality and set membership are by canonical millisecond value: the timer
/// string `"01:30"` and the bare second count `90` both canonicalize to
/// `90000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetOffset(u64);

/// How a deployment writes its target offsets: as `MM:SS` timer strings or as
/// bare second counts. Also selects the payload form of outbound alerts.
///
/// The two forms are alternative parsing strategies and are never mixed
/// within one configuration delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    /// Strict `MM:SS` timer strings, e.g. `"01:30"`.
    MinutesSeconds,
    /// Bare non-negative integer second counts, e.g. `"90"`.
    Seconds,
}

impl TargetOffset {
    pub const fn from_millis(millis: u64) -> Self {
        TargetOffset(millis)
    }

    pub const fn from_seconds(seconds: u64) -> Self {
        TargetOffset(seconds * 1000)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub const fn as_seconds(self) -> u64 {
        self.0 / 1000
    }

    /// Parse one trimmed token according to `format`. Returns `None` for
    /// anything that does not match the strict grammar; malformed entries are
    /// treated as not present, never as an error.
    pub fn parse(token: &str, format: TargetFormat) -> Option<Self> {
        match format {
            TargetFormat::MinutesSeconds => Self::parse_timer_string(token),
            TargetFormat::Seconds => Self::parse_seconds(token),
        }
    }

    /// Strict `MM:SS`: exactly two digits on each side of a single colon,
    /// minutes and seconds both in 00..=59. `"5:9"` and `"60:00"` are
    /// rejected; this keeps parsing the exact inverse of [`fmt::Display`].
    fn parse_timer_string(token: &str) -> Option<Self> {
        let (minutes, seconds) = token.split_once(':')?;
        if minutes.len() != 2 || seconds.len() != 2 {
            return None;
        }
        if !minutes.bytes().all(|b| b.is_ascii_digit())
            || !seconds.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let minutes: u64 = minutes.parse().ok()?;
        let seconds: u64 = seconds.parse().ok()?;
        if minutes > 59 || seconds > 59 {
            return None;
        }
        Some(Self::from_seconds(minutes * 60 + seconds))
    }

    /// Bare integer second count. Digits only: no sign, no fractional part.
    /// Counts whose millisecond value does not fit in `u64` are dropped like
    /// any other invalid token.
    fn parse_seconds(token: &str) -> Option<Self> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let seconds: u64 = token.parse().ok()?;
        seconds.checked_mul(1000).map(TargetOffset)
    }

    /// The payload sent to the host when this offset fires: the canonical
    /// `"MM:SS"` string or the integer second count, per deployment.
    pub fn payload(self, format: TargetFormat) -> Value {
        match format {
            TargetFormat::MinutesSeconds => Value::String(self.to_string()),
            TargetFormat::Seconds => Value::from(self.as_seconds()),
        }
    }
}

impl fmt::Display for TargetOffset {
    /// Canonical zero-padded `MM:SS` form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.0 / 1000;
        write!(f, "{:02}:{:02}", total_seconds / 60, total_seconds % 60)
    }
}

/// The de-duplicated, validated collection of target offsets, rebuilt
/// wholesale from the host's raw configuration text on every delivery.
///
/// Iteration order is first occurrence in the input, which keeps test runs
/// deterministic; order does not affect scheduling correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    offsets: Vec<TargetOffset>,
}

impl TargetSet {
    /// Build a set from comma-separated raw configuration text.
    ///
    /// Tokens are trimmed, parsed per `format`, invalid ones silently
    /// dropped, and duplicates collapsed to their first occurrence. Pure
    /// function of the input text.
    pub fn parse(text: &str, format: TargetFormat) -> Self {
        let mut offsets = Vec::new();
        for token in text.split(',') {
            if let Some(offset) = TargetOffset::parse(token.trim(), format) {
                if !offsets.contains(&offset) {
                    offsets.push(offset);
                }
            }
        }
        TargetSet { offsets }
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TargetOffset> + '_ {
        self.offsets.iter().copied()
    }
}
