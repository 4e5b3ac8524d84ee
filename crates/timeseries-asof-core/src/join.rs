//! As-of join.
//!
//! For every record of the driving series, find the record of the other
//! series nearest in time in the requested direction, optionally within a
//! tolerance and restricted to equal key tuples. Every driving record is
//! emitted exactly once and in its original order; records without a match
//! carry nulls in the other series' columns.
//!
//! Each driving partition receives the slice of the other series it can
//! possibly match (see [`crate::exchange`]) and is joined with a single
//! forward scan: because driving times are non-decreasing, the candidate
//! cursor into the other slice only ever moves forward.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use arrow::array::RecordBatch;
use arrow::row::{Row, Rows};
use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::assemble::{JoinLayout, assemble_series};
use crate::context::ExecutionContext;
use crate::error::{EngineError, InvalidDirectionSnafu, InvalidDurationSnafu};
use crate::exchange::{Extent, Reach, Scale, exchange_aligned, for_each_partition};
use crate::key::{KeyColumns, KeyEncoder};
use crate::series::TimeSeries;
use crate::time_unit::{TimeUnit, parse_duration};

/// Which side of a driving record's time a match may lie on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinDirection {
    /// Latest other record at or before the driving time (`<=`).
    Backward,
    /// Earliest other record at or after the driving time (`>=`).
    Forward,
}

impl JoinDirection {
    /// Comparison symbol of the direction.
    pub const fn symbol(self) -> &'static str {
        match self {
            JoinDirection::Backward => "<=",
            JoinDirection::Forward => ">=",
        }
    }
}

impl fmt::Display for JoinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinDirection::Backward => f.write_str("backward"),
            JoinDirection::Forward => f.write_str("forward"),
        }
    }
}

impl FromStr for JoinDirection {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "<=" | "backward" => Ok(JoinDirection::Backward),
            ">=" | "forward" => Ok(JoinDirection::Forward),
            _ => InvalidDirectionSnafu { direction: s }.fail(),
        }
    }
}

/// Parameters of an as-of join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Match direction.
    pub direction: JoinDirection,
    /// Maximum time distance of a match; `None` is unbounded.
    pub tolerance: Option<Duration>,
    /// Prefix for the driving series' non-time columns.
    pub left_prefix: Option<String>,
    /// Prefix for the other series' non-time columns.
    pub right_prefix: Option<String>,
    /// Columns whose values must be equal for a match.
    pub keys: Vec<String>,
    /// Exclude other records at exactly the driving time.
    pub strict: bool,
}

impl JoinSpec {
    /// Unbounded join in `direction`.
    pub fn new(direction: JoinDirection) -> Self {
        JoinSpec {
            direction,
            tolerance: None,
            left_prefix: None,
            right_prefix: None,
            keys: Vec::new(),
            strict: false,
        }
    }

    /// Backward (`<=`) join.
    pub fn backward() -> Self {
        Self::new(JoinDirection::Backward)
    }

    /// Forward (`>=`) join.
    pub fn forward() -> Self {
        Self::new(JoinDirection::Forward)
    }

    /// Parse the direction from `forward`/`backward`/`>=`/`<=`.
    pub fn parse(direction: &str) -> Result<Self, EngineError> {
        Ok(Self::new(direction.parse()?))
    }

    /// Limit matches to `tolerance`.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Limit matches to a tolerance given as text such as `"5s"`.
    pub fn with_tolerance_str(self, tolerance: &str) -> Result<Self, EngineError> {
        let parsed = parse_duration(tolerance).context(InvalidDurationSnafu { spec: tolerance })?;
        Ok(self.with_tolerance(parsed))
    }

    /// Prefix the driving series' non-time columns.
    pub fn with_left_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.left_prefix = Some(prefix.into());
        self
    }

    /// Prefix the other series' non-time columns.
    pub fn with_right_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.right_prefix = Some(prefix.into());
        self
    }

    /// Restrict matches to equal values of `keys`.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Exclude exact-time candidates.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Boundary reach in ticks of `unit`.
    fn reach(&self, unit: TimeUnit) -> Reach {
        let far = match self.tolerance {
            Some(tolerance) => Extent::Ticks(unit.tolerance_ticks(tolerance)),
            None if self.keys.is_empty() => Extent::Nearest,
            None => Extent::Unbounded,
        };
        match self.direction {
            JoinDirection::Backward => Reach::new(far, Extent::Ticks(0)),
            JoinDirection::Forward => Reach::new(Extent::Ticks(0), far),
        }
    }
}

/// Candidate search over one ordered run of other-series positions.
#[derive(Debug, Clone, Copy)]
struct Matcher {
    direction: JoinDirection,
    strict: bool,
    tolerance: Option<i64>,
}

impl Matcher {
    /// Advance `cursor` over `times` for driving time `target` and return
    /// the matched position, if any.
    ///
    /// Ties at the best time resolve to the record nearest the driving
    /// record in sequence order: the last one looking backward, the first
    /// one looking forward.
    #[inline]
    fn seek(&self, times: &[i64], cursor: &mut usize, target: i64) -> Option<usize> {
        let candidate = match self.direction {
            JoinDirection::Backward => {
                while *cursor < times.len()
                    && (times[*cursor] < target || (!self.strict && times[*cursor] == target))
                {
                    *cursor += 1;
                }
                cursor.checked_sub(1)?
            }
            JoinDirection::Forward => {
                while *cursor < times.len()
                    && (times[*cursor] < target || (self.strict && times[*cursor] == target))
                {
                    *cursor += 1;
                }
                (*cursor < times.len()).then_some(*cursor)?
            }
        };
        match self.tolerance {
            Some(tol) if times[candidate].abs_diff(target) > tol.unsigned_abs() => None,
            _ => Some(candidate),
        }
    }
}

/// Other-series rows of one key, in order.
struct KeyRun {
    positions: Vec<usize>,
    times: Vec<i64>,
    cursor: usize,
}

fn match_unkeyed(matcher: Matcher, driving: &[i64], other: &[i64]) -> Vec<Option<u64>> {
    let mut cursor = 0;
    driving
        .iter()
        .map(|&t| matcher.seek(other, &mut cursor, t).map(|i| i as u64))
        .collect()
}

fn match_keyed(
    matcher: Matcher,
    driving: &[i64],
    driving_keys: &Rows,
    other: &[i64],
    other_keys: &Rows,
) -> Vec<Option<u64>> {
    let mut runs: HashMap<Row<'_>, KeyRun> = HashMap::new();
    for (i, &t) in other.iter().enumerate() {
        let run = runs.entry(other_keys.row(i)).or_insert_with(|| KeyRun {
            positions: Vec::new(),
            times: Vec::new(),
            cursor: 0,
        });
        run.positions.push(i);
        run.times.push(t);
    }

    driving
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let run = runs.get_mut(&driving_keys.row(i))?;
            let found = matcher.seek(&run.times, &mut run.cursor, t)?;
            Some(run.positions[found] as u64)
        })
        .collect()
}

/// Join `driving` with `other` as of each driving record's time.
///
/// The result has exactly `driving.num_rows()` rows, in driving's order and
/// time unit. Comparisons happen in the finer unit of the two series.
pub fn asof_join(
    ctx: &ExecutionContext,
    driving: &TimeSeries,
    other: &TimeSeries,
    spec: &JoinSpec,
) -> Result<TimeSeries, EngineError> {
    let validate = ctx.config().validate_sorted;
    let driving = driving.prepared(validate)?;
    let other = other.prepared(validate)?;

    let driving_keys = KeyColumns::resolve(driving.schema(), &spec.keys)?;
    let other_keys = KeyColumns::resolve(other.schema(), &spec.keys)?;
    let encoder = KeyEncoder::for_join(
        &spec.keys,
        (driving.schema(), &driving_keys),
        (other.schema(), &other_keys),
    )?;

    let layout = JoinLayout::new(
        &driving,
        &other,
        other_keys.indices(),
        spec.left_prefix.as_deref(),
        spec.right_prefix.as_deref(),
    )?;

    let unit = driving.time_unit().finer(other.time_unit());
    let reach = spec.reach(unit);
    let matcher = Matcher {
        direction: spec.direction,
        strict: spec.strict,
        tolerance: spec.tolerance.map(|d| unit.tolerance_ticks(d)),
    };

    let slices = exchange_aligned(ctx, &driving, &other, unit, reach)?;

    let driving_scale = Scale::new(driving.time_unit(), unit);
    let other_scale = Scale::new(other.time_unit(), unit);
    let other_time = other.time_index();
    let other_time_name = other.time_column();

    let outputs = for_each_partition(ctx, driving.num_partitions(), |j| {
        let batch = &driving.partitions()[j];
        let slice = &slices[j];

        let d_times: Vec<i64> = driving
            .times(j)?
            .iter()
            .map(|&t| driving_scale.apply(t))
            .collect();
        let o_times: Vec<i64> = crate::schema::time_values(slice, other_time, other_time_name)?
            .iter()
            .map(|&t| other_scale.apply(t))
            .collect();

        let matches = match &encoder {
            None => match_unkeyed(matcher, &d_times, &o_times),
            Some(encoder) => {
                let d_keys = encoder.encode(batch, &driving_keys)?;
                let o_keys = encoder.encode(slice, &other_keys)?;
                match_keyed(matcher, &d_times, &d_keys, &o_times, &o_keys)
            }
        };

        layout.assemble(batch, slice, matches)
    })?;

    debug!(
        "as-of join {} ({}) over {} partitions: {} driving rows against {} exchanged rows",
        spec.direction,
        spec.direction.symbol(),
        driving.num_partitions(),
        driving.num_rows(),
        slices.iter().map(RecordBatch::num_rows).sum::<usize>(),
    );

    assemble_series(
        layout.schema().clone(),
        driving.time_column(),
        driving.time_unit(),
        true,
        outputs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(direction: JoinDirection, strict: bool, tolerance: Option<i64>) -> Matcher {
        Matcher {
            direction,
            strict,
            tolerance,
        }
    }

    #[test]
    fn direction_parses_words_and_symbols() -> Result<(), EngineError> {
        assert_eq!("<=".parse::<JoinDirection>()?, JoinDirection::Backward);
        assert_eq!("Forward".parse::<JoinDirection>()?, JoinDirection::Forward);
        assert_eq!(" >= ".parse::<JoinDirection>()?, JoinDirection::Forward);
        let err = "sideways".parse::<JoinDirection>().unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidDirection { direction } if direction == "sideways")
        );
        Ok(())
    }

    #[test]
    fn backward_ties_pick_the_last_record() {
        let m = matcher(JoinDirection::Backward, false, None);
        let got = match_unkeyed(m, &[0, 2, 3, 9], &[1, 2, 2, 5]);
        assert_eq!(got, vec![None, Some(2), Some(2), Some(3)]);
    }

    #[test]
    fn forward_ties_pick_the_first_record() {
        let m = matcher(JoinDirection::Forward, false, None);
        let got = match_unkeyed(m, &[0, 2, 3, 9], &[1, 2, 2, 5]);
        assert_eq!(got, vec![Some(0), Some(1), Some(3), None]);
    }

    #[test]
    fn strict_skips_exact_times() {
        let back = matcher(JoinDirection::Backward, true, None);
        assert_eq!(match_unkeyed(back, &[2, 5], &[1, 2, 5]), vec![Some(0), Some(1)]);

        let fwd = matcher(JoinDirection::Forward, true, None);
        assert_eq!(match_unkeyed(fwd, &[2, 5], &[1, 2, 5]), vec![Some(2), None]);
    }

    #[test]
    fn tolerance_is_inclusive() {
        let m = matcher(JoinDirection::Backward, false, Some(2));
        assert_eq!(
            match_unkeyed(m, &[3, 4, 10], &[1, 7]),
            vec![Some(0), None, None]
        );
    }

    #[test]
    fn reach_follows_direction_tolerance_and_keys() {
        let unit = TimeUnit::Milliseconds;
        assert_eq!(
            JoinSpec::backward().reach(unit),
            Reach::new(Extent::Nearest, Extent::Ticks(0))
        );
        assert_eq!(
            JoinSpec::forward().with_keys(["id"]).reach(unit),
            Reach::new(Extent::Ticks(0), Extent::Unbounded)
        );
        assert_eq!(
            JoinSpec::backward()
                .with_tolerance(Duration::seconds(2))
                .reach(unit),
            Reach::new(Extent::Ticks(2_000), Extent::Ticks(0))
        );
    }

    #[test]
    fn tolerance_text_is_parsed() -> Result<(), EngineError> {
        let spec = JoinSpec::forward().with_tolerance_str("250ms")?;
        assert_eq!(spec.tolerance, Some(Duration::milliseconds(250)));
        let err = JoinSpec::forward().with_tolerance_str("soon").unwrap_err();
        assert!(matches!(err, EngineError::InvalidDuration { .. }));
        Ok(())
    }
}
