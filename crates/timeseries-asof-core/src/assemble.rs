//! Output schema construction and partition assembly.
//!
//! Every operation builds its output schema once, up front, so that name
//! collisions are reported before any partition is processed. Partition
//! outputs are then gathered in partition order into a new [`TimeSeries`].
use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, UInt64Array, new_null_array};
use arrow::compute::take;
use arrow::datatypes::{Field, FieldRef, Schema, SchemaRef};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, ColumnCollisionSnafu, EngineError};
use crate::series::TimeSeries;
use crate::time_unit::TimeUnit;

/// Fail with `ColumnCollision` on the first repeated field name.
pub(crate) fn ensure_unique(fields: &[FieldRef]) -> Result<(), EngineError> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        ensure!(
            seen.insert(field.name().as_str()),
            ColumnCollisionSnafu {
                column: field.name().as_str(),
            }
        );
    }
    Ok(())
}

fn prefixed(field: &Field, prefix: Option<&str>) -> Field {
    match prefix {
        Some(p) => field.clone().with_name(format!("{p}_{}", field.name())),
        None => field.clone(),
    }
}

/// Column layout of an as-of join result.
#[derive(Debug, Clone)]
pub(crate) struct JoinLayout {
    schema: SchemaRef,
    driving: Vec<usize>,
    other: Vec<usize>,
}

impl JoinLayout {
    /// Lay out driving's time column, driving's other columns, then the
    /// other series' non-time, non-key columns (made nullable).
    pub(crate) fn new(
        driving: &TimeSeries,
        other: &TimeSeries,
        other_keys: &[usize],
        left_prefix: Option<&str>,
        right_prefix: Option<&str>,
    ) -> Result<Self, EngineError> {
        let time = driving.time_index();
        let driving_schema = driving.schema();
        let other_schema = other.schema();

        let mut fields: Vec<FieldRef> = vec![driving_schema.fields()[time].clone()];
        let mut driving_cols = vec![time];
        for (i, field) in driving_schema.fields().iter().enumerate() {
            if i != time {
                fields.push(Arc::new(prefixed(field, left_prefix)));
                driving_cols.push(i);
            }
        }

        let mut other_cols = Vec::new();
        for (i, field) in other_schema.fields().iter().enumerate() {
            if i == other.time_index() || other_keys.contains(&i) {
                continue;
            }
            fields.push(Arc::new(prefixed(field, right_prefix).with_nullable(true)));
            other_cols.push(i);
        }

        ensure_unique(&fields)?;
        Ok(JoinLayout {
            schema: Arc::new(Schema::new(fields)),
            driving: driving_cols,
            other: other_cols,
        })
    }

    pub(crate) fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Build one output partition: the driving rows followed by the matched
    /// other rows (`None` produces nulls).
    pub(crate) fn assemble(
        &self,
        driving: &RecordBatch,
        other: &RecordBatch,
        matches: Vec<Option<u64>>,
    ) -> Result<RecordBatch, EngineError> {
        let mut columns: Vec<ArrayRef> = self
            .driving
            .iter()
            .map(|&i| driving.column(i).clone())
            .collect();

        if other.num_rows() == 0 {
            for &i in &self.other {
                columns.push(new_null_array(
                    other.schema().field(i).data_type(),
                    driving.num_rows(),
                ));
            }
        } else {
            let indices = UInt64Array::from(matches);
            for &i in &self.other {
                columns.push(take(other.column(i).as_ref(), &indices, None).context(ArrowSnafu)?);
            }
        }

        RecordBatch::try_new(self.schema.clone(), columns).context(ArrowSnafu)
    }
}

/// Append an aggregate field to `schema`, rejecting name collisions.
pub(crate) fn with_appended(schema: &Schema, field: Field) -> Result<SchemaRef, EngineError> {
    let mut fields: Vec<FieldRef> = schema.fields().iter().cloned().collect();
    fields.push(Arc::new(field));
    ensure_unique(&fields)?;
    Ok(Arc::new(Schema::new(fields)))
}

/// Schema of a fresh result from its fields, rejecting name collisions.
pub(crate) fn schema_of(fields: Vec<Field>) -> Result<SchemaRef, EngineError> {
    let fields: Vec<FieldRef> = fields.into_iter().map(Arc::new).collect();
    ensure_unique(&fields)?;
    Ok(Arc::new(Schema::new(fields)))
}

/// Gather partition outputs, in order, into a new series.
pub(crate) fn assemble_series(
    schema: SchemaRef,
    time_column: &str,
    time_unit: TimeUnit,
    sorted: bool,
    partitions: Vec<RecordBatch>,
) -> Result<TimeSeries, EngineError> {
    Ok(TimeSeries::from_canonical(
        schema,
        time_column,
        time_unit,
        sorted,
        partitions,
    )?)
}
