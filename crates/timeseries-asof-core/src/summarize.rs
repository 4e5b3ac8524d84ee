//! Windowed, cumulative, grouped and cycle summaries.
//!
//! | keys | window | incremental | output |
//! |---|---|---|---|
//! | none | unbounded | no | one row for the whole series |
//! | none | unbounded | yes | one row per record: it and every earlier record |
//! | some | unbounded | no | one row per distinct key tuple |
//! | some | unbounded | yes | one row per record: it and every earlier record with its key |
//! | any | past/future | - | one row per record: the records (same key) inside its window |
//!
//! Time windows exchange boundary records between neighbouring partitions;
//! unbounded summaries exchange mergeable per-key state instead.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, RecordBatch, UInt64Array};
use arrow::compute::{concat_batches, interleave, take};
use arrow::datatypes::{DataType, Field, SchemaRef};
use arrow::row::{OwnedRow, Rows};
use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::accumulator::{Accumulator, AggregateBuilder, SlidingWindow, aggregate_field};
use crate::assemble::{assemble_series, schema_of, with_appended};
use crate::context::ExecutionContext;
use crate::error::{
    ArrowSnafu, EngineError, InvalidDurationSnafu, InvalidWindowSnafu, UnsupportedAggregateSnafu,
};
use crate::exchange::{Extent, Reach, exchange_neighbors, for_each_partition};
use crate::key::{KeyColumns, KeyEncoder, group_ids};
use crate::schema::{self, UnsupportedValueTypeSnafu};
use crate::series::TimeSeries;
use crate::time_unit::parse_duration;

/// Summary statistic computed over a window or group. Nulls are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    /// Sum of values; `0` when empty.
    Sum,
    /// Number of non-null values (any column type).
    Count,
    /// Arithmetic mean.
    Average,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Sample variance; needs two values.
    Variance,
    /// Sample standard deviation; needs two values.
    StdDev,
    /// Earliest value in sequence order.
    First,
    /// Latest value in sequence order.
    Last,
}

impl AggregateKind {
    /// Every aggregate kind.
    pub const ALL: [AggregateKind; 9] = [
        AggregateKind::Sum,
        AggregateKind::Count,
        AggregateKind::Average,
        AggregateKind::Min,
        AggregateKind::Max,
        AggregateKind::Variance,
        AggregateKind::StdDev,
        AggregateKind::First,
        AggregateKind::Last,
    ];

    /// Suffix of the default output column name (`<column>_<suffix>`).
    pub const fn suffix(self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Count => "count",
            AggregateKind::Average => "mean",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Variance => "var",
            AggregateKind::StdDev => "stddev",
            AggregateKind::First => "first",
            AggregateKind::Last => "last",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for AggregateKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateKind::Sum),
            "count" => Ok(AggregateKind::Count),
            "avg" | "average" | "mean" => Ok(AggregateKind::Average),
            "min" => Ok(AggregateKind::Min),
            "max" => Ok(AggregateKind::Max),
            "var" | "variance" => Ok(AggregateKind::Variance),
            "std" | "stddev" => Ok(AggregateKind::StdDev),
            "first" => Ok(AggregateKind::First),
            "last" => Ok(AggregateKind::Last),
            _ => UnsupportedAggregateSnafu { name: s }.fail(),
        }
    }
}

/// Time window relative to each record's own time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// `(t - d, t]`.
    Past(Duration),
    /// `[t, t + d)`.
    Future(Duration),
    /// No per-record window; whole groups or cumulative prefixes.
    Unbounded,
}

impl WindowSpec {
    /// Past window from text such as `"3s"`.
    pub fn past(duration: &str) -> Result<Self, EngineError> {
        Ok(WindowSpec::Past(parse_window(duration)?))
    }

    /// Future window from text such as `"500ms"`.
    pub fn future(duration: &str) -> Result<Self, EngineError> {
        Ok(WindowSpec::Future(parse_window(duration)?))
    }

    fn validate(&self) -> Result<(), EngineError> {
        match self {
            WindowSpec::Past(d) | WindowSpec::Future(d) => ensure!(
                *d > Duration::zero(),
                InvalidWindowSnafu {
                    duration: d.to_string()
                }
            ),
            WindowSpec::Unbounded => {}
        }
        Ok(())
    }
}

fn parse_window(text: &str) -> Result<Duration, EngineError> {
    let duration = parse_duration(text).context(InvalidDurationSnafu { spec: text })?;
    ensure!(
        duration > Duration::zero(),
        InvalidWindowSnafu { duration: text }
    );
    Ok(duration)
}

/// Parameters of a summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizeSpec {
    /// Value column to aggregate.
    pub column: String,
    /// Statistic to compute.
    pub aggregate: AggregateKind,
    /// Window around each record.
    pub window: WindowSpec,
    /// Grouping columns; empty means one implicit group.
    pub key_columns: Vec<String>,
    /// For unbounded windows: one output per record instead of per group.
    pub incremental: bool,
    /// Output column name; defaults to `<column>_<suffix>`.
    pub alias: Option<String>,
}

impl SummarizeSpec {
    /// Whole-series `aggregate` of `column`.
    pub fn new(column: impl Into<String>, aggregate: AggregateKind) -> Self {
        SummarizeSpec {
            column: column.into(),
            aggregate,
            window: WindowSpec::Unbounded,
            key_columns: Vec::new(),
            incremental: false,
            alias: None,
        }
    }

    /// Set the window.
    pub fn with_window(mut self, window: WindowSpec) -> Self {
        self.window = window;
        self
    }

    /// Group by `keys`.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_columns = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Emit one output per record for unbounded windows.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Name the output column.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name of the aggregate output column.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => format!("{}_{}", self.column, self.aggregate.suffix()),
        }
    }
}

/// Resolved inputs shared by every summary shape.
struct Prepared<'a> {
    series: TimeSeries,
    spec: &'a SummarizeSpec,
    value: usize,
    keys: KeyColumns,
    encoder: Option<KeyEncoder>,
}

impl<'a> Prepared<'a> {
    fn new(
        ctx: &ExecutionContext,
        series: &TimeSeries,
        spec: &'a SummarizeSpec,
    ) -> Result<Self, EngineError> {
        spec.window.validate()?;
        let series = series.prepared(ctx.config().validate_sorted)?;
        let value = schema::column_index(series.schema(), &spec.column)?;
        if spec.aggregate != AggregateKind::Count {
            let datatype = series.schema().field(value).data_type();
            ensure!(
                datatype.is_numeric(),
                UnsupportedValueTypeSnafu {
                    column: spec.column.as_str(),
                    datatype: datatype.clone(),
                }
            );
        }
        let keys = KeyColumns::resolve(series.schema(), &spec.key_columns)?;
        let encoder = KeyEncoder::for_schema(series.schema(), &keys)?;
        Ok(Prepared {
            series,
            spec,
            value,
            keys,
            encoder,
        })
    }

    fn times<'b>(&self, batch: &'b RecordBatch) -> Result<&'b [i64], EngineError> {
        Ok(schema::time_values(
            batch,
            self.series.time_index(),
            self.series.time_column(),
        )?)
    }

    fn values(&self, batch: &RecordBatch) -> Result<Vec<Option<f64>>, EngineError> {
        Ok(schema::value_column(
            batch,
            self.value,
            &self.spec.column,
            self.spec.aggregate == AggregateKind::Count,
        )?)
    }

    fn encode(&self, batch: &RecordBatch) -> Result<Option<Rows>, EngineError> {
        self.encoder
            .as_ref()
            .map(|encoder| encoder.encode(batch, &self.keys))
            .transpose()
    }

    /// Schema of per-record outputs: every input column plus the aggregate.
    fn per_record_schema(&self) -> Result<SchemaRef, EngineError> {
        with_appended(
            self.series.schema(),
            aggregate_field(self.spec.aggregate, &self.spec.output_name()),
        )
    }

    /// Schema of per-group outputs: time, key columns, aggregate.
    fn per_group_schema(&self) -> Result<SchemaRef, EngineError> {
        let schema = self.series.schema();
        let mut fields = vec![Field::new(self.series.time_column(), DataType::Int64, false)];
        fields.extend(
            self.keys
                .indices()
                .iter()
                .map(|&i| schema.field(i).clone()),
        );
        fields.push(aggregate_field(
            self.spec.aggregate,
            &self.spec.output_name(),
        ));
        schema_of(fields)
    }

    fn finish(
        self,
        schema: SchemaRef,
        sorted: bool,
        partitions: Vec<RecordBatch>,
    ) -> Result<TimeSeries, EngineError> {
        assemble_series(
            schema,
            self.series.time_column(),
            self.series.time_unit(),
            sorted,
            partitions,
        )
    }
}

fn with_column(
    schema: &SchemaRef,
    batch: &RecordBatch,
    column: ArrayRef,
) -> Result<RecordBatch, EngineError> {
    let mut columns = batch.columns().to_vec();
    columns.push(column);
    RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)
}

/// Row positions of each group, groups in order of first appearance.
fn members(ids: &[usize], groups: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); groups];
    for (row, &g) in ids.iter().enumerate() {
        members[g].push(row);
    }
    members
}

/// Summarize `series` as described by `spec`.
pub fn summarize(
    ctx: &ExecutionContext,
    series: &TimeSeries,
    spec: &SummarizeSpec,
) -> Result<TimeSeries, EngineError> {
    let prepared = Prepared::new(ctx, series, spec)?;
    debug!(
        "summarize {} of {} over {} rows in {} partitions (window {:?}, keys {:?}, incremental {})",
        spec.aggregate,
        spec.column,
        prepared.series.num_rows(),
        prepared.series.num_partitions(),
        spec.window,
        spec.key_columns,
        spec.incremental
    );

    let unit = prepared.series.time_unit();
    match spec.window {
        WindowSpec::Past(d) => windowed(ctx, prepared, Side::Past, unit.window_ticks(d)),
        WindowSpec::Future(d) => windowed(ctx, prepared, Side::Future, unit.window_ticks(d)),
        WindowSpec::Unbounded if spec.incremental => cumulative(ctx, prepared),
        WindowSpec::Unbounded => grouped(ctx, prepared),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Past,
    Future,
}

/// Slide a window of `width` ticks over one group's rows, calling `emit`
/// with each row and the window state for it.
fn scan_group(
    side: Side,
    width: i64,
    rows: &[usize],
    times: &[i64],
    values: &[Option<f64>],
    mut emit: impl FnMut(usize, &SlidingWindow),
) {
    let mut window = SlidingWindow::default();
    let (mut start, mut end) = (0, 0);
    for &row in rows {
        let t = times[row];
        match side {
            Side::Past => {
                while end < rows.len() && times[rows[end]] <= t {
                    window.push(end, values[rows[end]]);
                    end += 1;
                }
                while t.saturating_sub(times[rows[start]]) >= width {
                    window.evict(start);
                    start += 1;
                }
            }
            Side::Future => {
                while end < rows.len() && times[rows[end]].saturating_sub(t) < width {
                    window.push(end, values[rows[end]]);
                    end += 1;
                }
                while times[rows[start]] < t {
                    window.evict(start);
                    start += 1;
                }
            }
        }
        emit(row, &window);
    }
}

fn windowed(
    ctx: &ExecutionContext,
    prepared: Prepared<'_>,
    side: Side,
    width: i64,
) -> Result<TimeSeries, EngineError> {
    let reach = match side {
        Side::Past => Reach::new(Extent::Ticks(width - 1), Extent::Ticks(0)),
        Side::Future => Reach::new(Extent::Ticks(0), Extent::Ticks(width - 1)),
    };
    let overlaps = exchange_neighbors(ctx, &prepared.series, reach)?;
    let schema = prepared.per_record_schema()?;
    let input_schema = prepared.series.schema();

    let outputs = for_each_partition(ctx, prepared.series.num_partitions(), |j| {
        let local = &prepared.series.partitions()[j];
        let overlap = &overlaps[j];
        let span = concat_batches(input_schema, [&overlap.before, local, &overlap.after])
            .context(ArrowSnafu)?;
        let offset = overlap.before.num_rows();
        let local_rows = offset..offset + local.num_rows();

        let times = prepared.times(&span)?;
        let values = prepared.values(&span)?;
        let keys = prepared.encode(&span)?;
        let (ids, groups) = group_ids(keys.as_ref(), span.num_rows());

        let mut states = vec![Accumulator::default(); local.num_rows()];
        for rows in members(&ids, groups) {
            scan_group(side, width, &rows, times, &values, |row, window| {
                if local_rows.contains(&row) {
                    states[row - offset] = window.snapshot();
                }
            });
        }

        let mut builder = AggregateBuilder::with_capacity(prepared.spec.aggregate, states.len());
        states.iter().for_each(|state| builder.append(state));
        with_column(&schema, local, builder.finish())
    })?;

    prepared.finish(schema, true, outputs)
}

/// One partition's rows grouped by key, with the group totals.
struct PartitionGroups {
    ids: Vec<usize>,
    keys: Vec<Option<OwnedRow>>,
    firsts: Vec<usize>,
    latest: Vec<i64>,
    totals: Vec<Accumulator>,
    values: Vec<Option<f64>>,
}

fn partition_groups(
    prepared: &Prepared<'_>,
    batch: &RecordBatch,
) -> Result<PartitionGroups, EngineError> {
    let times = prepared.times(batch)?;
    let values = prepared.values(batch)?;
    let rows = prepared.encode(batch)?;
    let (ids, groups) = group_ids(rows.as_ref(), batch.num_rows());

    let mut firsts = vec![usize::MAX; groups];
    let mut latest = vec![i64::MIN; groups];
    let mut totals = vec![Accumulator::default(); groups];
    for (row, &g) in ids.iter().enumerate() {
        if firsts[g] == usize::MAX {
            firsts[g] = row;
        }
        latest[g] = latest[g].max(times[row]);
        totals[g].push_opt(values[row]);
    }
    let keys = firsts
        .iter()
        .map(|&row| rows.as_ref().map(|rows| rows.row(row).owned()))
        .collect();

    Ok(PartitionGroups {
        ids,
        keys,
        firsts,
        latest,
        totals,
        values,
    })
}

fn cumulative(ctx: &ExecutionContext, prepared: Prepared<'_>) -> Result<TimeSeries, EngineError> {
    let n = prepared.series.num_partitions();
    let published = for_each_partition(ctx, n, |j| {
        partition_groups(&prepared, &prepared.series.partitions()[j])
    })?;

    // starting state of each partition's groups, in group order
    let mut running: HashMap<Option<OwnedRow>, Accumulator> = HashMap::new();
    let mut starts: Vec<Vec<Accumulator>> = Vec::with_capacity(n);
    for part in &published {
        let mut start = Vec::with_capacity(part.keys.len());
        for (key, total) in part.keys.iter().zip(&part.totals) {
            let state = running.entry(key.clone()).or_default();
            start.push(*state);
            state.merge(total);
        }
        starts.push(start);
    }
    debug!(
        "cumulative summary exchanged state for {} keys across {} partitions",
        running.len(),
        n
    );

    let schema = prepared.per_record_schema()?;
    let outputs = for_each_partition(ctx, n, |j| {
        let part = &published[j];
        let mut states = starts[j].clone();

        let mut builder = AggregateBuilder::with_capacity(prepared.spec.aggregate, part.ids.len());
        for (&g, &value) in part.ids.iter().zip(&part.values) {
            states[g].push_opt(value);
            builder.append(&states[g]);
        }
        with_column(&schema, &prepared.series.partitions()[j], builder.finish())
    })?;

    prepared.finish(schema, true, outputs)
}

/// Whole-group state after the ordered merge of every partition.
struct Group {
    state: Accumulator,
    latest: i64,
    source: (usize, usize),
}

fn grouped(ctx: &ExecutionContext, prepared: Prepared<'_>) -> Result<TimeSeries, EngineError> {
    let n = prepared.series.num_partitions();
    let published = for_each_partition(ctx, n, |j| {
        partition_groups(&prepared, &prepared.series.partitions()[j])
    })?;

    let mut order: Vec<Group> = Vec::new();
    let mut index: HashMap<&Option<OwnedRow>, usize> = HashMap::new();
    for (p, part) in published.iter().enumerate() {
        for (g, key) in part.keys.iter().enumerate() {
            let slot = *index.entry(key).or_insert_with(|| {
                order.push(Group {
                    state: Accumulator::default(),
                    latest: i64::MIN,
                    source: (p, part.firsts[g]),
                });
                order.len() - 1
            });
            let group = &mut order[slot];
            group.state.merge(&part.totals[g]);
            group.latest = group.latest.max(part.latest[g]);
        }
    }

    let schema = prepared.per_group_schema()?;
    if order.is_empty() && prepared.keys.indices().is_empty() {
        // whole-series row of an empty series
        order.push(Group {
            state: Accumulator::default(),
            latest: 0,
            source: (0, 0),
        });
    }
    debug!(
        "grouped summary merged {} partitions into {} groups",
        n,
        order.len()
    );
    if order.is_empty() {
        return prepared.finish(schema, true, Vec::new());
    }

    let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from_iter_values(
        order.iter().map(|g| g.latest),
    ))];
    let sources: Vec<(usize, usize)> = order.iter().map(|g| g.source).collect();
    for &k in prepared.keys.indices() {
        let arrays: Vec<&dyn Array> = prepared
            .series
            .partitions()
            .iter()
            .map(|batch| batch.column(k).as_ref())
            .collect();
        columns.push(interleave(&arrays, &sources).context(ArrowSnafu)?);
    }
    let mut builder = AggregateBuilder::with_capacity(prepared.spec.aggregate, order.len());
    order.iter().for_each(|g| builder.append(&g.state));
    columns.push(builder.finish());

    let sorted = order.len() <= 1;
    let batch = RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)?;
    prepared.finish(schema, sorted, vec![batch])
}

/// Summarize each cycle: the records sharing one exact time (and key tuple).
///
/// Produces one row per distinct `(time, key tuple)` with columns time, key
/// columns and the aggregate, in time order. `spec.window` and
/// `spec.incremental` do not apply.
pub fn summarize_cycles(
    ctx: &ExecutionContext,
    series: &TimeSeries,
    spec: &SummarizeSpec,
) -> Result<TimeSeries, EngineError> {
    let spec = SummarizeSpec {
        window: WindowSpec::Unbounded,
        incremental: false,
        ..spec.clone()
    };
    let prepared = Prepared::new(ctx, series, &spec)?;
    let overlaps = exchange_neighbors(ctx, &prepared.series, Reach::EXACT)?;
    let schema = prepared.per_group_schema()?;
    let input_schema = prepared.series.schema();

    let outputs = for_each_partition(ctx, prepared.series.num_partitions(), |j| {
        let local = &prepared.series.partitions()[j];
        let overlap = &overlaps[j];
        let span = concat_batches(input_schema, [local, &overlap.after]).context(ArrowSnafu)?;

        let times = prepared.times(&span)?;
        let values = prepared.values(&span)?;
        let keys = prepared.encode(&span)?;
        let first_time = times.first().copied().unwrap_or_default();

        // a (time, key) group belongs to the partition holding its first
        // record: it must start locally and be absent from earlier partitions
        let before_keys = prepared.encode(&overlap.before)?;
        let claimed: HashSet<_> = before_keys
            .as_ref()
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        let owned = |t: i64, row: usize| {
            row < local.num_rows()
                && (overlap.before.num_rows() == 0
                    || t != first_time
                    || keys
                        .as_ref()
                        .is_some_and(|keys| !claimed.contains(&keys.row(row))))
        };

        let mut out_times = Vec::new();
        let mut out_rows: Vec<u64> = Vec::new();
        let mut builder = AggregateBuilder::with_capacity(prepared.spec.aggregate, span.num_rows());

        let mut start = 0;
        while start < times.len() {
            let t = times[start];
            let end = start + times[start..].partition_point(|&x| x == t);
            let cycle: Vec<usize> = (start..end).collect();
            let cycle_keys = keys.as_ref();
            let (ids, groups) = match cycle_keys {
                Some(rows) => {
                    let mut seen = HashMap::new();
                    let ids: Vec<usize> = cycle
                        .iter()
                        .map(|&r| {
                            let next = seen.len();
                            *seen.entry(rows.row(r)).or_insert(next)
                        })
                        .collect();
                    let groups = seen.len();
                    (ids, groups)
                }
                None => (vec![0; cycle.len()], 1),
            };

            let mut states = vec![Accumulator::default(); groups];
            let mut firsts = vec![usize::MAX; groups];
            for (&row, &g) in cycle.iter().zip(&ids) {
                states[g].push_opt(values[row]);
                if firsts[g] == usize::MAX {
                    firsts[g] = row;
                }
            }
            for (state, &row) in states.iter().zip(&firsts) {
                if owned(t, row) {
                    out_times.push(t);
                    out_rows.push(row as u64);
                    builder.append(state);
                }
            }
            start = end;
        }

        let indices = UInt64Array::from(out_rows);
        let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(out_times))];
        for &k in prepared.keys.indices() {
            columns.push(take(span.column(k).as_ref(), &indices, None).context(ArrowSnafu)?);
        }
        columns.push(builder.finish());
        RecordBatch::try_new(schema.clone(), columns).context(ArrowSnafu)
    })?;

    debug!(
        "cycle summary of {} produced {} rows",
        spec.column,
        outputs.iter().map(RecordBatch::num_rows).sum::<usize>()
    );
    prepared.finish(schema, true, outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_names_parse() -> Result<(), EngineError> {
        assert_eq!("avg".parse::<AggregateKind>()?, AggregateKind::Average);
        assert_eq!("StdDev".parse::<AggregateKind>()?, AggregateKind::StdDev);
        assert!(matches!(
            "median".parse::<AggregateKind>(),
            Err(EngineError::UnsupportedAggregate { .. })
        ));
        Ok(())
    }

    #[test]
    fn output_name_defaults_to_column_and_suffix() {
        let spec = SummarizeSpec::new("v", AggregateKind::Average);
        assert_eq!(spec.output_name(), "v_mean");
        assert_eq!(spec.with_alias("avg_v").output_name(), "avg_v");
    }

    #[test]
    fn windows_must_be_positive() {
        assert!(matches!(
            WindowSpec::past("0s"),
            Err(EngineError::InvalidWindow { .. })
        ));
        assert!(matches!(
            WindowSpec::future("later"),
            Err(EngineError::InvalidDuration { .. })
        ));
        assert!(WindowSpec::Past(Duration::seconds(-1)).validate().is_err());
        assert_eq!(
            WindowSpec::past("3s").ok(),
            Some(WindowSpec::Past(Duration::seconds(3)))
        );
    }

    fn sums(side: Side, width: i64, times: &[i64], values: &[Option<f64>]) -> Vec<f64> {
        let rows: Vec<usize> = (0..times.len()).collect();
        let mut out = vec![f64::NAN; times.len()];
        scan_group(side, width, &rows, times, values, |row, window| {
            out[row] = window.snapshot().finish(AggregateKind::Sum).unwrap_or(f64::NAN);
        });
        out
    }

    #[test]
    fn past_window_is_open_on_the_left() {
        let times = [1, 3, 4, 6, 7, 10];
        let values = [Some(4.0), Some(-2.0), None, Some(5.0), None, Some(1.0)];
        assert_eq!(
            sums(Side::Past, 3, &times, &values),
            vec![4.0, 2.0, -2.0, 5.0, 5.0, 1.0]
        );
    }

    #[test]
    fn future_window_is_open_on_the_right() {
        let times = [1, 3, 4, 6, 7, 10];
        let values = [Some(4.0), Some(-2.0), None, Some(5.0), None, Some(1.0)];
        assert_eq!(
            sums(Side::Future, 3, &times, &values),
            vec![2.0, -2.0, 5.0, 5.0, 0.0, 1.0]
        );
    }

    #[test]
    fn equal_times_share_a_window() {
        let times = [5, 5, 5];
        let values = [Some(1.0), Some(2.0), Some(4.0)];
        assert_eq!(sums(Side::Past, 1, &times, &values), vec![7.0, 7.0, 7.0]);
        assert_eq!(sums(Side::Future, 1, &times, &values), vec![7.0, 7.0, 7.0]);
    }
}
