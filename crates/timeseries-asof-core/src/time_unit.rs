//! Canonical time units and human-friendly durations.
//!
//! Every [`TimeSeries`](crate::series::TimeSeries) stores its time column as
//! `i64` ticks of one [`TimeUnit`]. This module defines the recognized units,
//! how values move between units, and how duration strings such as `"5s"` or
//! `"250ms"` are parsed and converted into tick counts:
//!
//! - Refining (coarse -> fine) multiplies and saturates at the `i64` range.
//! - Coarsening (fine -> coarse) floors, so a timestamp always lands in the
//!   tick that contains it.
//! - Tolerances convert with [`TimeUnit::tolerance_ticks`] (floor) and window
//!   spans with [`TimeUnit::window_ticks`] (ceil, used with a strict `<`).
use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Unit of the canonical `i64` time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// 1 tick = 1 nanosecond.
    Nanoseconds,
    /// 1 tick = 1 microsecond.
    Microseconds,
    /// 1 tick = 1 millisecond.
    Milliseconds,
    /// 1 tick = 1 second.
    Seconds,
    /// 1 tick = 1 minute.
    Minutes,
    /// 1 tick = 1 hour.
    Hours,
    /// 1 tick = 1 day.
    Days,
}

/// A unit string that is not one of the recognized [`TimeUnit`]s.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum ParseTimeUnitError {
    /// The unit is not in the recognized set.
    #[snafu(display(
        "unsupported time unit '{unit}' (expected nanoseconds|microseconds|milliseconds|seconds|minutes|hours|days)"
    ))]
    Unsupported {
        /// The unit string as supplied by the caller.
        unit: String,
    },
}

impl TimeUnit {
    /// Every recognized unit, finest first.
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    /// Length of one tick in nanoseconds.
    pub const fn nanos_per_tick(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => NANOS_PER_MICRO,
            TimeUnit::Milliseconds => NANOS_PER_MILLI,
            TimeUnit::Seconds => NANOS_PER_SECOND,
            TimeUnit::Minutes => NANOS_PER_MINUTE,
            TimeUnit::Hours => NANOS_PER_HOUR,
            TimeUnit::Days => NANOS_PER_DAY,
        }
    }

    /// Return whichever of `self` and `other` has the shorter tick.
    pub fn finer(self, other: TimeUnit) -> TimeUnit {
        if other.nanos_per_tick() < self.nanos_per_tick() {
            other
        } else {
            self
        }
    }

    /// Convert `value` ticks of `self` into ticks of `target`.
    ///
    /// Refining saturates at the `i64` bounds; coarsening floors (Euclidean
    /// division, so pre-epoch values floor towards negative infinity).
    pub fn rescale(self, value: i64, target: TimeUnit) -> i64 {
        let from = self.nanos_per_tick();
        let to = target.nanos_per_tick();
        if from == to {
            value
        } else if from > to {
            value.saturating_mul(from / to)
        } else {
            value.div_euclid(to / from)
        }
    }

    /// Like [`TimeUnit::rescale`] but reports overflow instead of saturating.
    pub fn checked_rescale(self, value: i64, target: TimeUnit) -> Option<i64> {
        let from = self.nanos_per_tick();
        let to = target.nanos_per_tick();
        if from > to {
            value.checked_mul(from / to)
        } else {
            Some(self.rescale(value, target))
        }
    }

    /// Largest tick distance `x` with `x * tick <= duration`.
    ///
    /// Negative durations clamp to zero.
    pub fn tolerance_ticks(self, duration: Duration) -> i64 {
        let nanos = duration_nanos(duration).max(0);
        nanos / self.nanos_per_tick()
    }

    /// Smallest tick count `w` such that a distance `x` lies inside the
    /// window iff `x < w`, i.e. `w = ceil(duration / tick)`.
    pub fn window_ticks(self, duration: Duration) -> i64 {
        let nanos = duration_nanos(duration).max(0);
        let tick = self.nanos_per_tick();
        nanos / tick + i64::from(nanos % tick != 0)
    }

    /// Short name used in output and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = ParseTimeUnitError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let unit = input.trim().to_ascii_lowercase();
        match unit.as_str() {
            "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            "us" | "micro" | "micros" | "microsecond" | "microseconds" => {
                Ok(TimeUnit::Microseconds)
            }
            "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => {
                Ok(TimeUnit::Milliseconds)
            }
            "s" | "sec" | "secs" | "second" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "min" | "mins" | "minute" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hr" | "hrs" | "hour" | "hours" => Ok(TimeUnit::Hours),
            "d" | "day" | "days" => Ok(TimeUnit::Days),
            _ => Err(ParseTimeUnitError::Unsupported {
                unit: input.to_string(),
            }),
        }
    }
}

fn duration_nanos(duration: Duration) -> i64 {
    duration.num_nanoseconds().unwrap_or(if duration < Duration::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Errors produced when parsing a human-friendly duration (e.g. `5s`).
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ParseDurationError {
    /// The duration string was empty or only whitespace.
    #[snafu(display("duration spec is empty"))]
    Empty,

    /// The duration did not start with a numeric value.
    #[snafu(display("duration spec '{spec}' is missing a numeric value"))]
    MissingNumber {
        /// The duration string as supplied.
        spec: String,
    },

    /// The duration did not include a unit suffix.
    #[snafu(display("duration spec '{spec}' is missing a unit suffix (expected ns|us|ms|s|m|h|d)"))]
    MissingUnit {
        /// The duration string as supplied.
        spec: String,
    },

    /// The numeric portion failed to parse.
    #[snafu(display("invalid duration value in '{spec}': {source}"))]
    InvalidNumber {
        /// The duration string as supplied.
        spec: String,
        /// The parse error returned by `u64::from_str`.
        source: std::num::ParseIntError,
    },

    /// The duration does not fit in `i64` nanoseconds.
    #[snafu(display("duration '{spec}' is too large to represent in nanoseconds"))]
    TooLarge {
        /// The duration string as supplied.
        spec: String,
    },

    /// The unit suffix is not recognized.
    #[snafu(display("unknown duration unit '{unit}' in '{spec}' (expected ns|us|ms|s|m|h|d)"))]
    UnknownUnit {
        /// The duration string as supplied.
        spec: String,
        /// The unrecognized unit suffix.
        unit: String,
    },
}

/// Parse a duration such as `5s`, `250ms`, `2min`, `1h` or `3d`.
///
/// Zero is accepted (`0s` is a valid exact-match tolerance); callers that need
/// a positive span check for it themselves.
pub fn parse_duration(input: &str) -> Result<Duration, ParseDurationError> {
    let spec = input.trim();
    if spec.is_empty() {
        return Err(ParseDurationError::Empty);
    }

    let Some(unit_start) = spec
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && !c.is_whitespace())
        .map(|(i, _)| i)
    else {
        return MissingUnitSnafu { spec }.fail();
    };

    if unit_start == 0 {
        return MissingNumberSnafu { spec }.fail();
    }

    let (num_str, unit_str) = spec.split_at(unit_start);
    let value: u64 = num_str
        .trim()
        .parse()
        .context(InvalidNumberSnafu { spec })?;

    let unit = match unit_str.trim() {
        "µs" | "μs" => TimeUnit::Microseconds,
        other => other.parse::<TimeUnit>().map_err(|_| ParseDurationError::UnknownUnit {
            spec: spec.to_string(),
            unit: unit_str.trim().to_string(),
        })?,
    };

    let nanos = i64::try_from(value)
        .ok()
        .and_then(|v| v.checked_mul(unit.nanos_per_tick()))
        .context(TooLargeSnafu { spec })?;

    Ok(Duration::nanoseconds(nanos))
}
