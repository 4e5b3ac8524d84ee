//! Key-tuple encoding.
//!
//! Key columns may have any Arrow type. They are encoded with Arrow's row
//! format so that a key tuple becomes a byte string with `Eq + Hash`; two
//! rows encoded by the same [`KeyEncoder`] are equal iff their key tuples are
//! equal (nulls compare equal to nulls).
use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Schema};
use arrow::row::{RowConverter, Rows, SortField};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, EngineError};
use crate::schema::{KeyTypeMismatchSnafu, column_index};

/// Positions of the key columns within one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyColumns {
    indices: Vec<usize>,
}

impl KeyColumns {
    /// Resolve `names` against `schema`.
    pub(crate) fn resolve(schema: &Schema, names: &[String]) -> Result<Self, EngineError> {
        let indices = names
            .iter()
            .map(|name| column_index(schema, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeyColumns { indices })
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn data_types(&self, schema: &Schema) -> Vec<DataType> {
        self.indices
            .iter()
            .map(|&i| schema.field(i).data_type().clone())
            .collect()
    }
}

/// Encodes key tuples of record batches into comparable rows.
#[derive(Debug)]
pub(crate) struct KeyEncoder {
    converter: RowConverter,
}

impl KeyEncoder {
    /// Encoder for key columns of `schema`, or `None` when there are no keys.
    pub(crate) fn for_schema(
        schema: &Schema,
        keys: &KeyColumns,
    ) -> Result<Option<Self>, EngineError> {
        if keys.indices.is_empty() {
            return Ok(None);
        }
        Self::from_types(keys.data_types(schema)).map(Some)
    }

    /// Encoder shared by two schemas whose key columns must agree on type.
    pub(crate) fn for_join(
        names: &[String],
        left: (&Schema, &KeyColumns),
        right: (&Schema, &KeyColumns),
    ) -> Result<Option<Self>, EngineError> {
        if names.is_empty() {
            return Ok(None);
        }
        let left_types = left.1.data_types(left.0);
        let right_types = right.1.data_types(right.0);
        for ((name, l), r) in names.iter().zip(&left_types).zip(&right_types) {
            ensure!(
                l == r,
                KeyTypeMismatchSnafu {
                    column: name.as_str(),
                    left: l.clone(),
                    right: r.clone(),
                }
            );
        }
        Self::from_types(left_types).map(Some)
    }

    fn from_types(types: Vec<DataType>) -> Result<Self, EngineError> {
        let fields = types.into_iter().map(SortField::new).collect();
        let converter = RowConverter::new(fields).context(ArrowSnafu)?;
        Ok(KeyEncoder { converter })
    }

    /// Encode the key tuple of every row of `batch`.
    pub(crate) fn encode(
        &self,
        batch: &RecordBatch,
        keys: &KeyColumns,
    ) -> Result<Rows, EngineError> {
        let columns: Vec<ArrayRef> = keys
            .indices
            .iter()
            .map(|&i| batch.column(i).clone())
            .collect();
        self.converter.convert_columns(&columns).context(ArrowSnafu)
    }
}

/// Assign dense group ids (in order of first appearance) to encoded keys.
///
/// Returns the per-row group id and the number of groups. Without an
/// encoder every row belongs to group 0.
pub(crate) fn group_ids(rows: Option<&Rows>, len: usize) -> (Vec<usize>, usize) {
    let Some(rows) = rows else {
        return (vec![0; len], usize::from(len > 0));
    };

    let mut ids = Vec::with_capacity(len);
    let mut seen = std::collections::HashMap::with_capacity(16);
    for i in 0..len {
        let next = seen.len();
        let id = *seen.entry(rows.row(i)).or_insert(next);
        ids.push(id);
    }
    (ids, seen.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::Field;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("time", DataType::Int64, false),
            Field::new("id", DataType::Utf8, true),
            Field::new("venue", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])),
                Arc::new(StringArray::from(vec![
                    Some("a"),
                    Some("b"),
                    Some("a"),
                    None,
                    None,
                ])),
                Arc::new(Int64Array::from(vec![1, 1, 1, 2, 2])),
            ],
        )
        .expect("valid batch")
    }

    #[test]
    fn group_ids_follow_first_appearance() -> Result<(), EngineError> {
        let batch = batch();
        let keys = KeyColumns::resolve(&batch.schema(), &["id".to_string()])?;
        let encoder = KeyEncoder::for_schema(&batch.schema(), &keys)?.expect("keys present");
        let rows = encoder.encode(&batch, &keys)?;

        let (ids, groups) = group_ids(Some(&rows), batch.num_rows());
        assert_eq!(ids, vec![0, 1, 0, 2, 2]);
        assert_eq!(groups, 3);
        Ok(())
    }

    #[test]
    fn composite_keys_distinguish_tuples() -> Result<(), EngineError> {
        let batch = batch();
        let keys = KeyColumns::resolve(&batch.schema(), &["venue".to_string(), "id".to_string()])?;
        let encoder = KeyEncoder::for_schema(&batch.schema(), &keys)?.expect("keys present");
        let rows = encoder.encode(&batch, &keys)?;

        let (ids, groups) = group_ids(Some(&rows), batch.num_rows());
        assert_eq!(ids, vec![0, 1, 0, 2, 2]);
        assert_eq!(groups, 3);
        Ok(())
    }

    #[test]
    fn no_keys_means_one_group() -> Result<(), EngineError> {
        let batch = batch();
        let keys = KeyColumns::resolve(&batch.schema(), &[])?;
        assert!(KeyEncoder::for_schema(&batch.schema(), &keys)?.is_none());
        assert_eq!(group_ids(None, 3), (vec![0, 0, 0], 1));
        assert_eq!(group_ids(None, 0), (vec![], 0));
        Ok(())
    }

    #[test]
    fn missing_key_column_is_a_schema_error() {
        let batch = batch();
        let err = KeyColumns::resolve(&batch.schema(), &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::Schema { .. }));
    }

    #[test]
    fn join_keys_must_agree_on_type() -> Result<(), EngineError> {
        let left = Schema::new(vec![Field::new("id", DataType::Utf8, true)]);
        let right = Schema::new(vec![Field::new("id", DataType::Int64, true)]);
        let names = vec!["id".to_string()];
        let lk = KeyColumns::resolve(&left, &names)?;
        let rk = KeyColumns::resolve(&right, &names)?;

        let err = KeyEncoder::for_join(&names, (&left, &lk), (&right, &rk)).unwrap_err();
        assert!(matches!(err, EngineError::Schema { .. }));
        Ok(())
    }
}
