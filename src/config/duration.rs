//! Human-readable duration values for configuration files.
//!
//! Accepts unit-suffixed strings such as `"14d"`, `"336h"`, `"1h30m"` or
//! `"1.5h"`, the way Go's `time.ParseDuration` reads them, plus days and weeks.
//! Supported units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`, `d`, `w`.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Unit name and length in nanoseconds, largest first.
const UNITS: &[(&str, u128)] = &[
    ("w", 7 * 24 * 3600 * NANOS_PER_SEC),
    ("d", 24 * 3600 * NANOS_PER_SEC),
    ("h", 3600 * NANOS_PER_SEC),
    ("m", 60 * NANOS_PER_SEC),
    ("s", NANOS_PER_SEC),
    ("ms", 1_000_000),
    ("us", 1_000),
    ("µs", 1_000),
    ("ns", 1),
];

/// Fraction digits beyond this are below nanosecond precision for every unit.
const MAX_FRACTION_DIGITS: usize = 18;

/// A duration parsed from a unit-suffixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct HumanDuration(Duration);

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self(Duration::from_secs(hours * 3600))
    }

    pub const fn from_days(days: u64) -> Self {
        Self(Duration::from_secs(days * 24 * 3600))
    }

    pub fn as_std(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl From<HumanDuration> for Duration {
    fn from(value: HumanDuration) -> Self {
        value.0
    }
}

/// Error returned when a duration string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct ParseDurationError {
    input: String,
    reason: &'static str,
}

impl ParseDurationError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl FromStr for HumanDuration {
    type Err = ParseDurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ParseDurationError::new(input, "empty value"));
        }
        if s == "0" {
            return Ok(Self(Duration::ZERO));
        }

        let mut total: u128 = 0;
        let mut rest = s;
        while !rest.is_empty() {
            let number_len = rest.len()
                - rest
                    .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
                    .len();
            let (whole, fraction) = match rest[..number_len].split_once('.') {
                Some((whole, fraction)) => (whole, fraction),
                None => (&rest[..number_len], ""),
            };
            if whole.is_empty() && fraction.is_empty() {
                return Err(ParseDurationError::new(input, "expected a number"));
            }
            if fraction.contains('.') {
                return Err(ParseDurationError::new(input, "invalid number"));
            }
            rest = &rest[number_len..];

            let unit_len = rest.len() - rest.trim_start_matches(char::is_alphabetic).len();
            if unit_len == 0 {
                return Err(ParseDurationError::new(input, "missing unit"));
            }
            let unit = &rest[..unit_len];
            rest = &rest[unit_len..];

            let factor = UNITS
                .iter()
                .find(|(name, _)| *name == unit)
                .map(|(_, factor)| *factor)
                .ok_or_else(|| ParseDurationError::new(input, "unknown unit"))?;

            let overflow = || ParseDurationError::new(input, "duration overflow");
            let whole: u128 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|_| overflow())?
            };
            let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let fraction_nanos = if fraction.is_empty() {
                0
            } else {
                let digits: u128 = fraction.parse().map_err(|_| overflow())?;
                digits * factor / 10u128.pow(fraction.len() as u32)
            };

            total = whole
                .checked_mul(factor)
                .and_then(|nanos| nanos.checked_add(fraction_nanos))
                .and_then(|nanos| total.checked_add(nanos))
                .ok_or_else(overflow)?;
        }

        let secs = u64::try_from(total / NANOS_PER_SEC)
            .map_err(|_| ParseDurationError::new(input, "duration overflow"))?;
        Ok(Self(Duration::new(secs, (total % NANOS_PER_SEC) as u32)))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut remaining = self.0.as_nanos();
        if remaining == 0 {
            return f.write_str("0s");
        }
        for (unit, factor) in UNITS {
            // Weeks read worse than days in config files; `us` is the canonical micro unit.
            if matches!(*unit, "w" | "µs") {
                continue;
            }
            let amount = remaining / factor;
            if amount > 0 {
                write!(f, "{amount}{unit}")?;
                remaining %= factor;
            }
        }
        Ok(())
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
