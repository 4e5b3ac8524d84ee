//! Boundary exchange between partitions.
//!
//! Partitions are processed independently, yet a match or window for a
//! record near a partition edge may live in another partition. Before an
//! operation runs, every partition receives the minimal slices of other
//! partitions it needs, as described by a [`Reach`].
//!
//! The exchange runs as a two-phase barrier on the context's worker pool:
//!
//! 1. **publish**: every source partition cuts, for every consumer, the
//!    zero-copy slice of its rows that falls inside the consumer's reach;
//! 2. **consume**: once all publications exist, every consumer concatenates
//!    the slices addressed to it in partition order.
//!
//! Because partitions are time ordered, the slices a consumer receives from
//! earlier (or later) partitions always form one contiguous run of the
//! global sequence.
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use log::debug;
use rayon::prelude::*;
use snafu::prelude::*;

use crate::context::ExecutionContext;
use crate::error::{BoundaryExchangeSnafu, EngineError};
use crate::series::TimeSeries;
use crate::time_unit::TimeUnit;

/// Inclusive time range of one non-empty partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimeRange {
    pub(crate) min: i64,
    pub(crate) max: i64,
}

impl TimeRange {
    /// Range of an ascending slice of times, `None` when empty.
    pub(crate) fn of_sorted(times: &[i64]) -> Option<Self> {
        match (times.first(), times.last()) {
            (Some(&min), Some(&max)) => Some(TimeRange { min, max }),
            _ => None,
        }
    }

    fn rescaled(self, scale: Scale) -> Self {
        TimeRange {
            min: scale.apply(self.min),
            max: scale.apply(self.max),
        }
    }
}

/// How far beyond a partition edge an operation looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Extent {
    /// Every record within this many ticks of the edge (inclusive).
    Ticks(i64),
    /// The records up to the edge plus the single closest record beyond it.
    Nearest,
    /// Everything on that side. Degrades the exchange to non-local.
    Unbounded,
}

/// Before/after extents required around a consumer's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reach {
    pub(crate) before: Extent,
    pub(crate) after: Extent,
}

impl Reach {
    pub(crate) const fn new(before: Extent, after: Extent) -> Self {
        Reach { before, after }
    }

    /// Only records sharing a boundary time.
    pub(crate) const EXACT: Reach = Reach::new(Extent::Ticks(0), Extent::Ticks(0));
}

/// Monotone conversion of source ticks into the unit comparisons use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scale {
    from: TimeUnit,
    to: TimeUnit,
}

impl Scale {
    pub(crate) fn new(from: TimeUnit, to: TimeUnit) -> Self {
        Scale { from, to }
    }

    pub(crate) fn identity(unit: TimeUnit) -> Self {
        Scale { from: unit, to: unit }
    }

    #[inline]
    pub(crate) fn apply(self, value: i64) -> i64 {
        self.from.rescale(value, self.to)
    }
}

/// Records a consumer received from the partitions around it.
#[derive(Debug, Clone)]
pub(crate) struct Overlap {
    /// Rows from earlier partitions, in order.
    pub(crate) before: RecordBatch,
    /// Rows from later partitions, in order.
    pub(crate) after: RecordBatch,
}

/// What one consumer accepts from the sources.
#[derive(Debug, Clone, Copy)]
struct Window {
    lo: i64,
    hi: i64,
    lower: Option<i64>,
    upper: Option<i64>,
    nearest_before: Option<usize>,
    nearest_after: Option<usize>,
}

impl Window {
    /// Plan the window of a consumer with `range` given every source range.
    ///
    /// `earlier`/`later` restrict which sources may supply the nearest
    /// record on each side.
    fn plan(
        range: TimeRange,
        reach: Reach,
        sources: &[Option<TimeRange>],
        earlier: impl Fn(usize) -> bool,
        later: impl Fn(usize) -> bool,
    ) -> Self {
        let lower = match reach.before {
            Extent::Ticks(n) => Some(range.min.saturating_sub(n)),
            Extent::Nearest => Some(range.min),
            Extent::Unbounded => None,
        };
        let upper = match reach.after {
            Extent::Ticks(n) => Some(range.max.saturating_add(n)),
            Extent::Nearest => Some(range.max),
            Extent::Unbounded => None,
        };

        let nearest_before = (reach.before == Extent::Nearest)
            .then(|| {
                sources
                    .iter()
                    .enumerate()
                    .rev()
                    .find(|(k, r)| earlier(*k) && r.is_some_and(|r| r.min < range.min))
                    .map(|(k, _)| k)
            })
            .flatten();
        let nearest_after = (reach.after == Extent::Nearest)
            .then(|| {
                sources
                    .iter()
                    .enumerate()
                    .find(|(k, r)| later(*k) && r.is_some_and(|r| r.max > range.max))
                    .map(|(k, _)| k)
            })
            .flatten();

        Window {
            lo: range.min,
            hi: range.max,
            lower,
            upper,
            nearest_before,
            nearest_after,
        }
    }

    /// Row span of `source`'s `times` that this consumer accepts.
    fn span(&self, source: usize, times: &[i64], scale: Scale) -> (usize, usize) {
        let mut start = match self.lower {
            Some(lower) => times.partition_point(|&t| scale.apply(t) < lower),
            None => 0,
        };
        let mut end = match self.upper {
            Some(upper) => times.partition_point(|&t| scale.apply(t) <= upper),
            None => times.len(),
        };
        if self.nearest_before == Some(source) {
            start = times
                .partition_point(|&t| scale.apply(t) < self.lo)
                .saturating_sub(1);
        }
        if self.nearest_after == Some(source) {
            end = (times.partition_point(|&t| scale.apply(t) <= self.hi) + 1).min(times.len());
        }
        (start, end.max(start))
    }
}

/// Run `task` once per partition index on the context's pool, collecting
/// the results in partition order. The first error aborts the collection.
pub(crate) fn for_each_partition<T, F>(
    ctx: &ExecutionContext,
    partitions: usize,
    task: F,
) -> Result<Vec<T>, EngineError>
where
    T: Send,
    F: Fn(usize) -> Result<T, EngineError> + Sync + Send,
{
    ctx.install(|| (0..partitions).into_par_iter().map(task).collect())
}

/// Phase 1: every source publishes its slice for every consumer.
///
/// Returns `published[source][consumer]`.
fn publish(
    ctx: &ExecutionContext,
    source: &TimeSeries,
    scale: Scale,
    windows: &[Option<Window>],
    addressed: impl Fn(usize, usize) -> bool + Sync + Send,
) -> Result<Vec<Vec<Option<RecordBatch>>>, EngineError> {
    for_each_partition(ctx, source.num_partitions(), |k| {
        let batch = &source.partitions()[k];
        let times = source.times(k)?;
        let slices = windows
            .iter()
            .enumerate()
            .map(|(j, window)| {
                let window = window.as_ref().filter(|_| addressed(k, j))?;
                let (start, end) = window.span(k, times, scale);
                (end > start).then(|| batch.slice(start, end - start))
            })
            .collect();
        Ok(slices)
    })
}

/// Phase 2 helper: concatenate the slices addressed to `consumer` from the
/// given sources, in source order.
fn gather(
    schema: &SchemaRef,
    published: &[Vec<Option<RecordBatch>>],
    consumer: usize,
    sources: impl Iterator<Item = usize>,
) -> Result<RecordBatch, EngineError> {
    let slices: Vec<&RecordBatch> = sources
        .filter_map(|k| published[k][consumer].as_ref())
        .collect();
    match slices.as_slice() {
        [] => Ok(RecordBatch::new_empty(schema.clone())),
        [single] => Ok((*single).clone()),
        _ => concat_batches(schema, slices).context(BoundaryExchangeSnafu {
            partition: consumer,
        }),
    }
}

fn rows(overlap: &[Option<RecordBatch>]) -> usize {
    overlap.iter().flatten().map(RecordBatch::num_rows).sum()
}

/// Exchange boundary records between the partitions of one series.
///
/// Consumer `j` receives rows of partitions `k < j` inside its `before`
/// reach as its `before` overlap, and rows of partitions `k > j` inside its
/// `after` reach as its `after` overlap.
pub(crate) fn exchange_neighbors(
    ctx: &ExecutionContext,
    series: &TimeSeries,
    reach: Reach,
) -> Result<Vec<Overlap>, EngineError> {
    let ranges = series.ranges()?;
    let windows: Vec<Option<Window>> = ranges
        .iter()
        .enumerate()
        .map(|(j, range)| {
            range.map(|range| Window::plan(range, reach, &ranges, |k| k < j, |k| k > j))
        })
        .collect();

    let scale = Scale::identity(series.time_unit());
    let published = publish(ctx, series, scale, &windows, |k, j| k != j)?;
    debug!(
        "boundary exchange: {} partitions published {} rows for reach {:?}",
        series.num_partitions(),
        published.iter().map(|p| rows(p)).sum::<usize>(),
        reach
    );

    let schema = series.schema();
    let n = series.num_partitions();
    for_each_partition(ctx, n, |j| {
        Ok(Overlap {
            before: gather(schema, &published, j, 0..j)?,
            after: gather(schema, &published, j, j + 1..n)?,
        })
    })
}

/// Slice `other` onto the partition ranges of `driving`.
///
/// Comparisons happen in `unit`; `reach` is expressed in ticks of `unit`.
/// Consumer `j` receives, in order, every row of `other` inside
/// `[lo - before, hi + after]` of driving partition `j`.
pub(crate) fn exchange_aligned(
    ctx: &ExecutionContext,
    driving: &TimeSeries,
    other: &TimeSeries,
    unit: TimeUnit,
    reach: Reach,
) -> Result<Vec<RecordBatch>, EngineError> {
    let driving_scale = Scale::new(driving.time_unit(), unit);
    let other_scale = Scale::new(other.time_unit(), unit);

    let other_ranges: Vec<Option<TimeRange>> = other
        .ranges()?
        .into_iter()
        .map(|r| r.map(|r| r.rescaled(other_scale)))
        .collect();
    let windows: Vec<Option<Window>> = driving
        .ranges()?
        .into_iter()
        .map(|range| {
            range.map(|range| {
                Window::plan(
                    range.rescaled(driving_scale),
                    reach,
                    &other_ranges,
                    |_| true,
                    |_| true,
                )
            })
        })
        .collect();

    let published = publish(ctx, other, other_scale, &windows, |_, _| true)?;
    debug!(
        "aligned exchange: {} other partitions published {} rows onto {} driving partitions",
        other.num_partitions(),
        published.iter().map(|p| rows(p)).sum::<usize>(),
        driving.num_partitions()
    );

    let schema = other.schema();
    let sources = other.num_partitions();
    for_each_partition(ctx, driving.num_partitions(), |j| {
        gather(schema, &published, j, 0..sources)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{AsArray, Int64Array};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};

    use crate::context::EngineConfig;
    use crate::series::SourceOptions;

    fn series(parts: &[&[i64]], unit: TimeUnit) -> TimeSeries {
        let schema = Arc::new(Schema::new(vec![
            Field::new("time", DataType::Int64, false),
            Field::new("v", DataType::Int64, true),
        ]));
        let batches = parts.iter().map(|times| {
            RecordBatch::try_new(
                schema.clone(),
                vec![
                    Arc::new(Int64Array::from(times.to_vec())),
                    Arc::new(Int64Array::from(times.to_vec())),
                ],
            )
            .expect("valid batch")
        });
        TimeSeries::from_batches_with_schema(
            schema.clone(),
            batches,
            &SourceOptions::new("time", unit),
        )
        .expect("valid series")
    }

    fn times(batch: &RecordBatch) -> Vec<i64> {
        batch.column(0).as_primitive::<Int64Type>().values().to_vec()
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(EngineConfig::default().with_parallelism(2)).expect("pool")
    }

    #[test]
    fn of_sorted_reports_first_and_last() {
        assert_eq!(
            TimeRange::of_sorted(&[2, 4, 9]),
            Some(TimeRange { min: 2, max: 9 })
        );
        assert_eq!(TimeRange::of_sorted(&[]), None);
    }

    #[test]
    fn neighbours_receive_rows_within_reach() -> Result<(), EngineError> {
        let ctx = ctx();
        let s = series(&[&[1, 2, 3], &[5, 6, 6], &[6, 8, 12]], TimeUnit::Seconds);
        let overlaps = exchange_neighbors(
            &ctx,
            &s,
            Reach::new(Extent::Ticks(2), Extent::Ticks(0)),
        )?;

        assert_eq!(times(&overlaps[0].before), Vec::<i64>::new());
        assert_eq!(times(&overlaps[0].after), Vec::<i64>::new());
        assert_eq!(times(&overlaps[1].before), vec![3]);
        // the equal-time record at the boundary is always exchanged
        assert_eq!(times(&overlaps[1].after), vec![6]);
        assert_eq!(times(&overlaps[2].before), vec![5, 6, 6]);
        assert_eq!(times(&overlaps[2].after), Vec::<i64>::new());
        Ok(())
    }

    #[test]
    fn unbounded_before_takes_the_whole_prefix() -> Result<(), EngineError> {
        let ctx = ctx();
        let s = series(&[&[1, 2], &[3, 4], &[5]], TimeUnit::Seconds);
        let overlaps = exchange_neighbors(
            &ctx,
            &s,
            Reach::new(Extent::Unbounded, Extent::Ticks(0)),
        )?;
        assert_eq!(times(&overlaps[2].before), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn nearest_adds_one_record_beyond_each_edge() -> Result<(), EngineError> {
        let ctx = ctx();
        let driving = series(&[&[1, 2], &[10, 11], &[30]], TimeUnit::Seconds);
        let other = series(&[&[0, 3, 3], &[4, 9], &[12, 20, 40]], TimeUnit::Seconds);

        let back = exchange_aligned(
            &ctx,
            &driving,
            &other,
            TimeUnit::Seconds,
            Reach::new(Extent::Nearest, Extent::Ticks(0)),
        )?;
        assert_eq!(times(&back[0]), vec![0]);
        assert_eq!(times(&back[1]), vec![9]);
        assert_eq!(times(&back[2]), vec![20]);

        let fwd = exchange_aligned(
            &ctx,
            &driving,
            &other,
            TimeUnit::Seconds,
            Reach::new(Extent::Ticks(0), Extent::Nearest),
        )?;
        assert_eq!(times(&fwd[0]), vec![3]);
        assert_eq!(times(&fwd[1]), vec![12]);
        assert_eq!(times(&fwd[2]), vec![40]);
        Ok(())
    }

    #[test]
    fn aligned_exchange_compares_in_the_finer_unit() -> Result<(), EngineError> {
        let ctx = ctx();
        let driving = series(&[&[2], &[5]], TimeUnit::Seconds);
        let other = series(
            &[&[1_500, 2_000, 4_100], &[4_999, 5_000, 5_001]],
            TimeUnit::Milliseconds,
        );

        let slices = exchange_aligned(
            &ctx,
            &driving,
            &other,
            TimeUnit::Milliseconds,
            Reach::new(Extent::Ticks(500), Extent::Ticks(0)),
        )?;
        assert_eq!(times(&slices[0]), vec![1_500, 2_000]);
        assert_eq!(times(&slices[1]), vec![4_999, 5_000]);
        Ok(())
    }
}
