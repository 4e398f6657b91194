use anyhow::{Context, Result};
use datafusion::arrow::array::{Array, Int64Array, RecordBatch};

pub fn typed_column_by_name<'a, T: core::any::Any>(
    rb: &'a RecordBatch,
    column_name: &str,
) -> Result<&'a T> {
    let column = rb
        .column_by_name(column_name)
        .with_context(|| format!("getting column {column_name}"))?;
    column
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("casting {column_name}: {:?}", column.data_type()))
}

/// Reads a non-null Int64 value from the single row produced by a global aggregate.
pub fn single_row_i64(batches: &[RecordBatch], column_name: &str) -> Result<i64> {
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .with_context(|| format!("aggregate for {column_name} returned no rows"))?;
    if batch.num_rows() != 1 {
        anyhow::bail!(
            "expected a single aggregate row for {column_name}, got {}",
            batch.num_rows()
        );
    }
    let values: &Int64Array = typed_column_by_name(batch, column_name)?;
    if values.is_null(0) {
        anyhow::bail!("aggregate {column_name} is null");
    }
    Ok(values.value(0))
}
