#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use timeseries_asof_core::{
    EngineConfig, EngineError, ExecutionContext, SourceOptions, TimeSeries, TimeUnit,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A context with a small fixed pool, so partitions really run concurrently.
pub fn ctx() -> Result<ExecutionContext, EngineError> {
    ExecutionContext::new(EngineConfig::default().with_parallelism(4))
}

/// A batch with an `Int64` `time` column followed by `columns`.
pub fn batch(times: &[i64], columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let mut fields = vec![Field::new("time", DataType::Int64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(times.to_vec()))];
    for (name, array) in columns {
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("valid test batch")
}

pub fn floats(values: &[Option<f64>]) -> ArrayRef {
    Arc::new(Float64Array::from(values.to_vec()))
}

pub fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn strings(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

/// A single-partition series in `unit`.
pub fn series(batch: RecordBatch, unit: TimeUnit) -> Result<TimeSeries, EngineError> {
    TimeSeries::from_batches(vec![batch], &SourceOptions::new("time", unit))
}

/// Series `A`: t = 1..10 s with `u` = 1..10.
pub fn series_a() -> Result<TimeSeries, EngineError> {
    let times: Vec<i64> = (1..=10).collect();
    series(batch(&times, vec![("u", ints(&times))]), TimeUnit::Seconds)
}

/// Series `B`: t = 2..11 s with `v` = 2..11.
pub fn series_b() -> Result<TimeSeries, EngineError> {
    let times: Vec<i64> = (2..=11).collect();
    series(batch(&times, vec![("v", ints(&times))]), TimeUnit::Seconds)
}

/// Every partitioning of `series` worth checking: 1, 2, 3 and one partition
/// per record.
pub fn partitionings(series: &TimeSeries) -> Result<Vec<TimeSeries>, EngineError> {
    [1, 2, 3, series.num_rows().max(1)]
        .into_iter()
        .map(|n| series.repartition(n))
        .collect()
}

pub fn f64_column(
    series: &TimeSeries,
    name: &str,
) -> Result<Vec<Option<f64>>, Box<dyn std::error::Error>> {
    let all = series.to_batch()?;
    let column = all.column_by_name(name).ok_or("missing column")?;
    let column = column
        .as_primitive_opt::<Float64Type>()
        .ok_or("not a float column")?;
    Ok(column.iter().collect())
}

pub fn i64_column(
    series: &TimeSeries,
    name: &str,
) -> Result<Vec<Option<i64>>, Box<dyn std::error::Error>> {
    let all = series.to_batch()?;
    let column = all.column_by_name(name).ok_or("missing column")?;
    let column = column
        .as_primitive_opt::<Int64Type>()
        .ok_or("not an int64 column")?;
    Ok(column.iter().collect())
}

pub fn column_names(series: &TimeSeries) -> Vec<String> {
    series
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

pub fn null_count(series: &TimeSeries, name: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let all = series.to_batch()?;
    Ok(all.column_by_name(name).ok_or("missing column")?.null_count())
}
