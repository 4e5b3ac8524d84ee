//! Schema adapter: locate, validate and normalize time columns.
//!
//! Source batches may carry their time column as:
//! - integral ticks (signed integers, `UInt8`..`UInt32`), already expressed
//!   in the requested unit,
//! - an Arrow `Timestamp(unit, tz)` of any precision,
//! - an Arrow `Date32` (days) or `Date64` (milliseconds), treated as midnight
//!   timestamps.
//!
//! [`normalize_batch`] replaces that column with a non-null `Int64` column of
//! canonical ticks and leaves every other column untouched. Ordering is never
//! checked here; sortedness is a declaration carried by the series.
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Array, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, SchemaRef, TimeUnit as ArrowTimeUnit,
};
use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::time_unit::TimeUnit;

/// Errors raised while adapting source schemas or resolving columns.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The declared time column does not exist.
    #[snafu(display("Time column {column} not found in schema"))]
    MissingTimeColumn {
        /// Name of the expected time column.
        column: String,
    },

    /// The time column exists but cannot be read as ticks, timestamps or dates.
    #[snafu(display("Unsupported arrow type for time column {column}: {datatype}"))]
    UnsupportedTimeType {
        /// Name of the time column.
        column: String,
        /// The Arrow data type that was found.
        datatype: DataType,
    },

    /// The time column contains a null; record times are never null.
    #[snafu(display("Time column {column} contains a null at row {row}"))]
    NullTime {
        /// Name of the time column.
        column: String,
        /// First offending row within its batch.
        row: usize,
    },

    /// Converting a time value to the canonical unit overflows `i64`.
    #[snafu(display("Time column {column} value {value} at row {row} overflows {unit} ticks"))]
    TimeOverflow {
        /// Name of the time column.
        column: String,
        /// Raw source value.
        value: i64,
        /// Row within its batch.
        row: usize,
        /// Canonical unit that could not represent the value.
        unit: TimeUnit,
    },

    /// A value or key column referenced by an operation does not exist.
    #[snafu(display("Column {column} not found in schema"))]
    MissingColumn {
        /// The missing column.
        column: String,
    },

    /// The aggregate needs numeric input but the column is not numeric.
    #[snafu(display("Column {column} has type {datatype}, which cannot be aggregated numerically"))]
    UnsupportedValueType {
        /// The value column.
        column: String,
        /// Its Arrow data type.
        datatype: DataType,
    },

    /// A join key column has different types on the two sides.
    #[snafu(display("Join key {column} has type {left} on the left but {right} on the right"))]
    KeyTypeMismatch {
        /// The key column.
        column: String,
        /// Type in the driving series.
        left: DataType,
        /// Type in the other series.
        right: DataType,
    },

    /// A partition's schema differs from the series schema.
    #[snafu(display("Partition {partition} schema does not match the series schema"))]
    PartitionSchemaMismatch {
        /// Index of the offending partition.
        partition: usize,
    },

    /// A series was built from zero batches and no schema was supplied.
    #[snafu(display("Cannot infer a schema from zero batches"))]
    NoSchema,

    /// Arrow failed while casting or rebuilding a batch.
    #[snafu(display("Arrow error while adapting schema: {source}"))]
    Cast {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// How a source time column is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeColumnKind {
    /// Integral ticks already expressed in the target unit.
    Ticks,
    /// Arrow timestamp with the given precision.
    Timestamp(ArrowTimeUnit),
    /// Days since the epoch.
    Date32,
    /// Milliseconds since the epoch, at midnight.
    Date64,
}

impl TimeColumnKind {
    /// Classify an Arrow type, or `None` when it cannot carry time.
    pub fn from_data_type(datatype: &DataType) -> Option<Self> {
        match datatype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Some(TimeColumnKind::Ticks),
            DataType::Timestamp(unit, _) => Some(TimeColumnKind::Timestamp(*unit)),
            DataType::Date32 => Some(TimeColumnKind::Date32),
            DataType::Date64 => Some(TimeColumnKind::Date64),
            _ => None,
        }
    }

    /// Unit of the raw `i64` values after casting, or `None` for ticks
    /// (which are taken as-is).
    fn source_unit(self) -> Option<SourceUnit> {
        match self {
            TimeColumnKind::Ticks => None,
            TimeColumnKind::Timestamp(ArrowTimeUnit::Second) => Some(SourceUnit(TimeUnit::Seconds)),
            TimeColumnKind::Timestamp(ArrowTimeUnit::Millisecond) => {
                Some(SourceUnit(TimeUnit::Milliseconds))
            }
            TimeColumnKind::Timestamp(ArrowTimeUnit::Microsecond) => {
                Some(SourceUnit(TimeUnit::Microseconds))
            }
            TimeColumnKind::Timestamp(ArrowTimeUnit::Nanosecond) => {
                Some(SourceUnit(TimeUnit::Nanoseconds))
            }
            TimeColumnKind::Date32 => Some(SourceUnit(TimeUnit::Days)),
            TimeColumnKind::Date64 => Some(SourceUnit(TimeUnit::Milliseconds)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SourceUnit(TimeUnit);

/// Resolve the index of a column, reporting it as the time column if absent.
pub fn time_column_index(schema: &Schema, column: &str) -> Result<usize, SchemaError> {
    schema
        .index_of(column)
        .map_err(|_| SchemaError::MissingTimeColumn {
            column: column.to_string(),
        })
}

/// Resolve the index of a value or key column.
pub fn column_index(schema: &Schema, column: &str) -> Result<usize, SchemaError> {
    schema.index_of(column).map_err(|_| SchemaError::MissingColumn {
        column: column.to_string(),
    })
}

/// Build the canonical schema: identical to `schema` except that the time
/// column becomes a non-null `Int64`.
pub fn canonical_schema(schema: &Schema, time_column: &str) -> Result<SchemaRef, SchemaError> {
    let ts_idx = time_column_index(schema, time_column)?;
    let datatype = schema.field(ts_idx).data_type();
    if TimeColumnKind::from_data_type(datatype).is_none() {
        return UnsupportedTimeTypeSnafu {
            column: time_column,
            datatype: datatype.clone(),
        }
        .fail();
    }

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == ts_idx {
                Field::new(field.name(), DataType::Int64, false)
            } else {
                field.as_ref().clone()
            }
        })
        .collect();

    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        schema.metadata().clone(),
    )))
}

/// Convert a batch's time column into canonical `unit` ticks.
pub fn canonical_ticks(
    batch: &RecordBatch,
    time_column: &str,
    unit: TimeUnit,
) -> Result<Int64Array, SchemaError> {
    let schema = batch.schema();
    let ts_idx = time_column_index(&schema, time_column)?;
    let column = batch.column(ts_idx);

    let kind = TimeColumnKind::from_data_type(column.data_type()).with_context(|| {
        UnsupportedTimeTypeSnafu {
            column: time_column,
            datatype: column.data_type().clone(),
        }
    })?;

    if let Some(row) = first_null(column.as_ref()) {
        return NullTimeSnafu {
            column: time_column,
            row,
        }
        .fail();
    }

    let raw = cast(column, &DataType::Int64).context(CastSnafu)?;
    let raw = raw.as_primitive::<Int64Type>();

    let Some(SourceUnit(source)) = kind.source_unit() else {
        return Ok(Int64Array::new(raw.values().clone(), None));
    };

    let mut ticks = Vec::with_capacity(raw.len());
    for (row, &value) in raw.values().iter().enumerate() {
        let converted =
            source
                .checked_rescale(value, unit)
                .with_context(|| TimeOverflowSnafu {
                    column: time_column,
                    value,
                    row,
                    unit,
                })?;
        ticks.push(converted);
    }
    Ok(Int64Array::from(ticks))
}

/// Replace the time column of `batch` with canonical ticks, conforming the
/// result to `schema` (as produced by [`canonical_schema`]).
pub fn normalize_batch(
    batch: &RecordBatch,
    schema: &SchemaRef,
    time_column: &str,
    unit: TimeUnit,
) -> Result<RecordBatch, SchemaError> {
    let ts_idx = time_column_index(schema, time_column)?;
    let ticks: ArrayRef = Arc::new(canonical_ticks(batch, time_column, unit)?);

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    if columns.len() != schema.fields().len() {
        return Err(SchemaError::Cast {
            source: ArrowError::SchemaError(format!(
                "batch has {} columns but the series schema has {}",
                columns.len(),
                schema.fields().len()
            )),
        });
    }
    columns[ts_idx] = ticks;

    RecordBatch::try_new(schema.clone(), columns).context(CastSnafu)
}

/// Borrow the canonical tick values of a normalized batch.
pub(crate) fn time_values<'a>(
    batch: &'a RecordBatch,
    ts_idx: usize,
    column: &str,
) -> Result<&'a [i64], SchemaError> {
    let array = batch.column(ts_idx);
    array
        .as_primitive_opt::<Int64Type>()
        .map(|values| values.values().as_ref())
        .with_context(|| UnsupportedTimeTypeSnafu {
            column,
            datatype: array.data_type().clone(),
        })
}

/// Read a value column as optional `f64`s (nulls preserved).
///
/// With `presence_only` any column type is accepted and each valid slot
/// reads as `0.0`; this is what `Count` needs.
pub(crate) fn value_column(
    batch: &RecordBatch,
    idx: usize,
    column: &str,
    presence_only: bool,
) -> Result<Vec<Option<f64>>, SchemaError> {
    let array = batch.column(idx);
    if presence_only {
        return Ok((0..array.len())
            .map(|i| array.is_valid(i).then_some(0.0))
            .collect());
    }

    ensure!(
        array.data_type().is_numeric(),
        UnsupportedValueTypeSnafu {
            column,
            datatype: array.data_type().clone(),
        }
    );

    let floats = cast(array, &DataType::Float64).context(CastSnafu)?;
    Ok(floats.as_primitive::<Float64Type>().iter().collect())
}

fn first_null(array: &dyn Array) -> Option<usize> {
    if array.null_count() == 0 {
        return None;
    }
    (0..array.len()).find(|&i| array.is_null(i))
}
