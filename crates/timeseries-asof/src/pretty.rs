//! Pretty-print helpers for result series.
//!
//! Aggregates are `f64`, and Arrow's pretty printer shows their full
//! binary-float representation, which produces distracting artifacts like
//! `0.30000000000000004`. Float columns are rendered here with a fixed
//! maximum number of decimal places and trailing zeros trimmed.

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, StringArray},
    datatypes::{DataType, Field, Float32Type, Float64Type, Schema},
    error::ArrowError,
    util::pretty::pretty_format_batches,
};
use timeseries_asof_core::TimeSeries;

/// Default maximum number of decimal places used for `f32`/`f64` values.
pub const DEFAULT_FLOAT_MAX_DECIMALS: usize = 6;

fn format_compact_float(value: f64, max_decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let prec = max_decimals.min(15);
    let mut s = format!("{value:.prec$}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }

    if s == "-0" {
        s.clear();
        s.push('0');
    }

    s
}

fn render_floats(column: &ArrayRef, max_decimals: usize) -> Option<ArrayRef> {
    let values: Vec<Option<String>> = match column.data_type() {
        DataType::Float64 => column
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(|v| format_compact_float(v, max_decimals)))
            .collect(),
        DataType::Float32 => column
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map(|v| format_compact_float(f64::from(v), max_decimals)))
            .collect(),
        _ => return None,
    };
    Some(Arc::new(StringArray::from(values)))
}

fn compact(batch: &RecordBatch, max_decimals: usize) -> Result<RecordBatch, ArrowError> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, column) in batch.schema().fields().iter().zip(batch.columns()) {
        match render_floats(column, max_decimals) {
            Some(rendered) => {
                fields.push(Field::new(field.name(), DataType::Utf8, column.is_nullable()));
                columns.push(rendered);
            }
            None => {
                fields.push(field.as_ref().clone());
                columns.push(column.clone());
            }
        }
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Pretty-format Arrow record batches, using compact `f32`/`f64` formatting.
///
/// This is intended for human-facing output (README examples, logs), not for
/// round-tripping numeric values.
pub fn pretty_format_batches_compact_floats(batches: &[RecordBatch]) -> Result<String, ArrowError> {
    pretty_format_batches_compact_floats_with_max_decimals(batches, DEFAULT_FLOAT_MAX_DECIMALS)
}

/// Same as [`pretty_format_batches_compact_floats`], but allows setting the maximum decimal places.
pub fn pretty_format_batches_compact_floats_with_max_decimals(
    batches: &[RecordBatch],
    max_decimals: usize,
) -> Result<String, ArrowError> {
    let rendered = batches
        .iter()
        .map(|batch| compact(batch, max_decimals))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pretty_format_batches(&rendered)?.to_string())
}

/// Pretty-format every partition of a series as one table.
pub fn pretty_format_series(series: &TimeSeries) -> Result<String, ArrowError> {
    if series.num_partitions() == 0 {
        let empty = RecordBatch::new_empty(series.schema().clone());
        return pretty_format_batches_compact_floats(&[empty]);
    }
    pretty_format_batches_compact_floats(series.partitions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use timeseries_asof_core::{SourceOptions, TimeUnit};

    #[test]
    fn compact_float_trims_trailing_zeros() {
        assert_eq!(format_compact_float(115.384_999_999_999_99, 6), "115.385");
        assert_eq!(format_compact_float(2.0, 6), "2");
        assert_eq!(format_compact_float(-0.000_000_1, 6), "0");
        assert_eq!(format_compact_float(f64::NAN, 6), "NaN");
    }

    #[test]
    fn series_renders_floats_compactly() -> Result<(), Box<dyn std::error::Error>> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("time", DataType::Int64, false),
            Field::new("v_mean", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Float64Array::from(vec![Some(0.1 + 0.2), None])),
            ],
        )?;
        let series =
            TimeSeries::from_batches(vec![batch], &SourceOptions::new("time", TimeUnit::Seconds))?;

        let rendered = pretty_format_series(&series)?;
        assert!(rendered.contains("| 0.3"));
        assert!(!rendered.contains("0.30000000000000004"));
        assert!(rendered.contains("v_mean"));
        Ok(())
    }
}
