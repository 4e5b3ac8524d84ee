//! The partitioned, time-ordered series abstraction.
//!
//! A [`TimeSeries`] is an immutable list of Arrow record batches (one per
//! partition) sharing a canonical schema whose time column is a non-null
//! `Int64` of [`TimeUnit`] ticks. Partitions are processed independently by
//! the engine; global order is the concatenation of partitions.
use arrow::array::{ArrayRef, RecordBatch, UInt64Array};
use arrow::compute::{concat_batches, take};
use arrow::datatypes::SchemaRef;
use log::warn;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{
    ArrowSnafu, EngineError, PartitionOutOfRangeSnafu, UnsupportedTimeUnitSnafu,
};
use crate::exchange::TimeRange;
use crate::schema::{self, NoSchemaSnafu, PartitionSchemaMismatchSnafu, SchemaError};
use crate::time_unit::TimeUnit;

/// How to interpret source batches when building a [`TimeSeries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Name of the time column.
    pub time_column: String,
    /// Canonical unit for the time column.
    pub time_unit: TimeUnit,
    /// Caller's declaration that batches are ordered by time, within and
    /// across batches.
    pub is_sorted: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        SourceOptions {
            time_column: "time".to_string(),
            time_unit: TimeUnit::Nanoseconds,
            is_sorted: true,
        }
    }
}

impl SourceOptions {
    /// Options for `time_column` in `unit`, declared sorted.
    pub fn new(time_column: impl Into<String>, time_unit: TimeUnit) -> Self {
        SourceOptions {
            time_column: time_column.into(),
            time_unit,
            is_sorted: true,
        }
    }

    /// Like [`SourceOptions::new`], parsing the unit from a string.
    pub fn parse(time_column: impl Into<String>, unit: &str) -> Result<Self, EngineError> {
        let time_unit = unit.parse().context(UnsupportedTimeUnitSnafu)?;
        Ok(Self::new(time_column, time_unit))
    }

    /// Override the sortedness declaration.
    pub fn with_sorted(mut self, is_sorted: bool) -> Self {
        self.is_sorted = is_sorted;
        self
    }
}

/// An ordered, partitioned sequence of time-stamped records.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    schema: SchemaRef,
    time_column: String,
    time_index: usize,
    time_unit: TimeUnit,
    sorted: bool,
    partitions: Vec<RecordBatch>,
}

impl TimeSeries {
    /// Build a series from source batches, one partition per batch.
    ///
    /// The time column is normalized according to `options`; empty batches
    /// are dropped. Fails when `batches` is empty; use
    /// [`TimeSeries::from_batches_with_schema`] for possibly-empty input.
    pub fn from_batches(
        batches: impl IntoIterator<Item = RecordBatch>,
        options: &SourceOptions,
    ) -> Result<Self, EngineError> {
        let batches: Vec<RecordBatch> = batches.into_iter().collect();
        let source_schema = batches.first().map(|b| b.schema()).context(NoSchemaSnafu)?;
        Self::from_batches_with_schema(source_schema, batches, options)
    }

    /// Build a series from source batches that all match `source_schema`.
    pub fn from_batches_with_schema(
        source_schema: SchemaRef,
        batches: impl IntoIterator<Item = RecordBatch>,
        options: &SourceOptions,
    ) -> Result<Self, EngineError> {
        let schema = schema::canonical_schema(&source_schema, &options.time_column)?;
        let time_index = schema::time_column_index(&schema, &options.time_column)?;

        let mut partitions = Vec::new();
        for (partition, batch) in batches.into_iter().enumerate() {
            ensure!(
                batch.schema().fields() == source_schema.fields(),
                PartitionSchemaMismatchSnafu { partition }
            );
            if batch.num_rows() == 0 {
                continue;
            }
            partitions.push(schema::normalize_batch(
                &batch,
                &schema,
                &options.time_column,
                options.time_unit,
            )?);
        }

        let series = TimeSeries {
            schema,
            time_column: options.time_column.clone(),
            time_index,
            time_unit: options.time_unit,
            sorted: options.is_sorted,
            partitions,
        };

        if series.sorted {
            Ok(series)
        } else {
            warn!(
                "series on {} declared unsorted; sorting {} rows by time",
                series.time_column,
                series.num_rows()
            );
            series.sort_by_time()
        }
    }

    /// Assemble a series from batches that are already canonical.
    pub(crate) fn from_canonical(
        schema: SchemaRef,
        time_column: &str,
        time_unit: TimeUnit,
        sorted: bool,
        partitions: Vec<RecordBatch>,
    ) -> Result<Self, SchemaError> {
        let time_index = schema::time_column_index(&schema, time_column)?;
        let partitions = partitions
            .into_iter()
            .filter(|batch| batch.num_rows() > 0)
            .collect();
        Ok(TimeSeries {
            schema,
            time_column: time_column.to_string(),
            time_index,
            time_unit,
            sorted,
            partitions,
        })
    }

    /// Canonical schema shared by every partition.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Name of the time column.
    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    /// Index of the time column in [`TimeSeries::schema`].
    pub fn time_index(&self) -> usize {
        self.time_index
    }

    /// Unit of the time column's ticks.
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Whether the series is declared ordered by time.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Partition batches in order.
    pub fn partitions(&self) -> &[RecordBatch] {
        &self.partitions
    }

    /// Number of (non-empty) partitions.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of records.
    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(RecordBatch::num_rows).sum()
    }

    /// Canonical tick values of one partition.
    pub fn times(&self, partition: usize) -> Result<&[i64], EngineError> {
        let batch = self
            .partitions
            .get(partition)
            .context(PartitionOutOfRangeSnafu {
                partition,
                partitions: self.partitions.len(),
            })?;
        Ok(schema::time_values(
            batch,
            self.time_index,
            &self.time_column,
        )?)
    }

    /// First and last time of each partition, in partition order.
    pub(crate) fn ranges(&self) -> Result<Vec<Option<TimeRange>>, EngineError> {
        (0..self.partitions.len())
            .map(|p| {
                let times = self.times(p)?;
                Ok(TimeRange::of_sorted(times))
            })
            .collect()
    }

    /// Concatenate every partition into a single batch.
    pub fn to_batch(&self) -> Result<RecordBatch, EngineError> {
        concat_batches(&self.schema, &self.partitions).context(ArrowSnafu)
    }

    /// Check the sortedness declaration: non-decreasing within each
    /// partition and across partition boundaries.
    pub fn validate_sorted(&self) -> Result<(), EngineError> {
        let mut previous: Option<i64> = None;
        for partition in 0..self.partitions.len() {
            for (row, &current) in self.times(partition)?.iter().enumerate() {
                if let Some(prev) = previous {
                    ensure!(
                        prev <= current,
                        crate::error::UnsortedInputSnafu {
                            partition,
                            row,
                            previous: prev,
                            current,
                        }
                    );
                }
                previous = Some(current);
            }
        }
        Ok(())
    }

    /// Redistribute records over `target` partitions of near-equal size,
    /// preserving order. Equal timestamps may straddle the new boundaries.
    pub fn repartition(&self, target: usize) -> Result<TimeSeries, EngineError> {
        let all = self.to_batch()?;
        let partitions = split_even(&all, target.max(1));
        Ok(TimeSeries {
            partitions,
            ..self.clone()
        })
    }

    /// Return a stably time-sorted copy (records with equal time keep their
    /// original order), keeping the partition count.
    pub fn sort_by_time(&self) -> Result<TimeSeries, EngineError> {
        let target = self.partitions.len();
        let all = self.to_batch()?;
        let times = schema::time_values(&all, self.time_index, &self.time_column)?;

        let mut order: Vec<usize> = (0..all.num_rows()).collect();
        order.sort_by_key(|&i| times[i]);
        let indices = UInt64Array::from_iter_values(order.into_iter().map(|i| i as u64));

        let columns = all
            .columns()
            .iter()
            .map(|column| take(column.as_ref(), &indices, None))
            .collect::<Result<Vec<ArrayRef>, _>>()
            .context(ArrowSnafu)?;
        let sorted = RecordBatch::try_new(self.schema.clone(), columns).context(ArrowSnafu)?;

        Ok(TimeSeries {
            partitions: split_even(&sorted, target.max(1)),
            sorted: true,
            ..self.clone()
        })
    }

    /// Sorted view for engine operations: validates when asked, sorts when the
    /// series is declared unsorted.
    pub(crate) fn prepared(&self, validate: bool) -> Result<TimeSeries, EngineError> {
        if !self.sorted {
            warn!(
                "operating on unsorted series ({} rows); sorting by {} first",
                self.num_rows(),
                self.time_column
            );
            return self.sort_by_time();
        }
        if validate {
            self.validate_sorted()?;
        }
        Ok(self.clone())
    }
}

fn split_even(batch: &RecordBatch, target: usize) -> Vec<RecordBatch> {
    let rows = batch.num_rows();
    if rows == 0 {
        return Vec::new();
    }
    let target = target.min(rows);
    let base = rows / target;
    let extra = rows % target;

    let mut out = Vec::with_capacity(target);
    let mut offset = 0;
    for p in 0..target {
        let len = base + usize::from(p < extra);
        out.push(batch.slice(offset, len));
        offset += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, TimestampSecondArray};
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit as ArrowTimeUnit};

    fn source(times: &[i64], values: &[f64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("ts", DataType::Timestamp(ArrowTimeUnit::Second, None), false),
            Field::new("v", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampSecondArray::from(times.to_vec())),
                Arc::new(Float64Array::from(values.to_vec())),
            ],
        )
        .expect("valid batch")
    }

    #[test]
    fn from_batches_normalizes_and_drops_empty_partitions()
    -> Result<(), Box<dyn std::error::Error>> {
        let options = SourceOptions::new("ts", TimeUnit::Milliseconds);
        let series = TimeSeries::from_batches(
            vec![source(&[1, 2], &[1.0, 2.0]), source(&[], &[]), source(&[3], &[3.0])],
            &options,
        )?;

        assert_eq!(series.num_partitions(), 2);
        assert_eq!(series.num_rows(), 3);
        assert_eq!(series.times(0)?, &[1_000, 2_000]);
        assert_eq!(series.times(1)?, &[3_000]);
        assert_eq!(series.schema().field(0).data_type(), &DataType::Int64);
        Ok(())
    }

    #[test]
    fn from_batches_requires_a_schema() {
        let err = TimeSeries::from_batches(Vec::new(), &SourceOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema {
                source: SchemaError::NoSchema
            }
        ));
    }

    #[test]
    fn parse_rejects_unknown_units() {
        let err = SourceOptions::parse("ts", "weeks").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedTimeUnit { .. }));
    }

    #[test]
    fn source_options_deserialize_with_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let options: SourceOptions = serde_json::from_str(r#"{"time_unit":"seconds"}"#)?;
        assert_eq!(options.time_column, "time");
        assert_eq!(options.time_unit, TimeUnit::Seconds);
        assert!(options.is_sorted);
        Ok(())
    }

    #[test]
    fn validate_sorted_detects_cross_partition_violation()
    -> Result<(), Box<dyn std::error::Error>> {
        let options = SourceOptions::new("ts", TimeUnit::Seconds);
        let series = TimeSeries::from_batches(
            vec![source(&[1, 5], &[0.0, 0.0]), source(&[4], &[0.0])],
            &options,
        )?;

        let err = series.validate_sorted().unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnsortedInput {
                partition: 1,
                row: 0,
                previous: 5,
                current: 4
            }
        ));
        Ok(())
    }

    #[test]
    fn unsorted_declaration_sorts_stably() -> Result<(), Box<dyn std::error::Error>> {
        let options = SourceOptions::new("ts", TimeUnit::Seconds).with_sorted(false);
        let series = TimeSeries::from_batches(
            vec![source(&[3, 1], &[30.0, 10.0]), source(&[1, 2], &[11.0, 20.0])],
            &options,
        )?;

        assert!(series.is_sorted());
        series.validate_sorted()?;
        let all = series.to_batch()?;
        let values = all
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or("v is f64")?;
        assert_eq!(values.values().as_ref(), &[10.0, 11.0, 20.0, 30.0]);
        Ok(())
    }

    #[test]
    fn out_of_range_partition_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let options = SourceOptions::new("ts", TimeUnit::Seconds);
        let series = TimeSeries::from_batches(vec![source(&[1, 2], &[0.0, 0.0])], &options)?;

        let err = series.times(1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::PartitionOutOfRange {
                partition: 1,
                partitions: 1
            }
        ));
        Ok(())
    }

    #[test]
    fn repartition_preserves_order_and_rows() -> Result<(), Box<dyn std::error::Error>> {
        let options = SourceOptions::new("ts", TimeUnit::Seconds);
        let series = TimeSeries::from_batches(
            vec![source(&[1, 2, 3, 4, 5, 6, 7], &[0.0; 7])],
            &options,
        )?;

        let split = series.repartition(3)?;
        assert_eq!(split.num_partitions(), 3);
        assert_eq!(split.times(0)?, &[1, 2, 3]);
        assert_eq!(split.times(1)?, &[4, 5]);
        assert_eq!(split.times(2)?, &[6, 7]);

        let many = series.repartition(100)?;
        assert_eq!(many.num_partitions(), 7);

        let ticks = many.to_batch()?;
        let ticks = ticks
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or("time is i64")?;
        assert_eq!(ticks.values().as_ref(), &[1, 2, 3, 4, 5, 6, 7]);
        Ok(())
    }
}
