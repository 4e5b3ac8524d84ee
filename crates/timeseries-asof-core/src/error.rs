//! Error types and SNAFU context selectors for engine operations.
//!
//! [`EngineError`] is the single error returned at the boundary of every
//! public operation (series construction, as-of join, summarization). Lower
//! layers keep their own enums ([`SchemaError`], [`ParseTimeUnitError`],
//! [`ParseDurationError`]) and are wrapped here with context. Selectors are
//! exposed crate-wide via `#[snafu(visibility(pub(crate)))]`.

use arrow::error::ArrowError;
use snafu::prelude::*;

use crate::{
    schema::SchemaError,
    time_unit::{ParseDurationError, ParseTimeUnitError},
};

/// Errors from engine operations.
///
/// Null-filled as-of matches and empty aggregate windows are designed
/// outcomes, never errors. Any error aborts the whole operation: no partial
/// result is returned.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    /// The input schema does not satisfy the operation (missing time column,
    /// unsupported time type, null times, missing value/key columns).
    #[snafu(display("Schema error: {source}"))]
    Schema {
        /// Underlying schema problem.
        source: SchemaError,
    },

    /// A caller-supplied unit string is not a recognized time unit.
    #[snafu(display("{source}"))]
    UnsupportedTimeUnit {
        /// Underlying parse error.
        source: ParseTimeUnitError,
    },

    /// A tolerance or window duration string could not be parsed.
    #[snafu(display("Invalid duration '{spec}': {source}"))]
    InvalidDuration {
        /// The duration string as supplied by the caller.
        spec: String,
        /// Underlying parse error.
        source: ParseDurationError,
    },

    /// Window durations must be strictly positive.
    #[snafu(display("Window duration must be positive, got {duration}"))]
    InvalidWindow {
        /// Rendered duration that was rejected.
        duration: String,
    },

    /// A join direction string is neither forward (`>=`) nor backward (`<=`).
    #[snafu(display("Invalid join direction '{direction}' (expected forward|backward|>=|<=)"))]
    InvalidDirection {
        /// The direction as supplied by the caller.
        direction: String,
    },

    /// An aggregate name is not one of the supported kinds.
    #[snafu(display("Unsupported aggregate '{name}'"))]
    UnsupportedAggregate {
        /// The name as supplied by the caller.
        name: String,
    },

    /// The output would contain two columns with the same name.
    #[snafu(display(
        "Output column {column} would appear twice; supply a prefix or alias to disambiguate"
    ))]
    ColumnCollision {
        /// The duplicated output column name.
        column: String,
    },

    /// A series declared sorted is not ordered by time.
    #[snafu(display(
        "Series declared sorted but partition {partition} row {row} has time {current} after {previous}"
    ))]
    UnsortedInput {
        /// Partition containing the offending row.
        partition: usize,
        /// Row index within that partition (0 when the violation is across
        /// a partition boundary).
        row: usize,
        /// Time of the preceding record.
        previous: i64,
        /// Time of the offending record.
        current: i64,
    },

    /// A partition index is outside the series.
    #[snafu(display(
        "Partition {partition} is out of range for a series of {partitions} partitions"
    ))]
    PartitionOutOfRange {
        /// Requested partition.
        partition: usize,
        /// Number of partitions in the series.
        partitions: usize,
    },

    /// A partition failed to assemble the boundary slices published by its
    /// neighbours; the operation is aborted as a whole.
    #[snafu(display("Boundary exchange failed for partition {partition}: {source}"))]
    BoundaryExchange {
        /// Consuming partition.
        partition: usize,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Arrow compute or construction error while building outputs.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The worker pool for an execution context could not be created.
    #[snafu(display("Failed to build worker pool: {message}"))]
    ThreadPool {
        /// Message reported by the pool builder.
        message: String,
    },
}

impl From<SchemaError> for EngineError {
    fn from(source: SchemaError) -> Self {
        EngineError::Schema { source }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
