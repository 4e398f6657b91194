use crate::dfext::column_ref::{ColumnRef, all_columns, has_column};
use crate::dfext::typed_column::single_row_i64;
use crate::error::{Error, Result};
use datafusion::arrow::datatypes::DataType;
use datafusion::common::{Column, DFSchema};
use datafusion::functions_aggregate::expr_fn::count;
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Characters rejected in column names by columnar table formats
pub const INVALID_COLUMN_NAME_CHARS: &[char] = &[' ', ',', ';', '{', '}', '(', ')', '\n', '\t', '='];

pub fn require_column(df: &DataFrame, name: &str) -> Result<ColumnRef> {
    ColumnRef::resolve(df.schema(), name)
}

/// Columns whose values are nested can't be proven empty by counting nulls and are always kept.
pub fn is_prunable_type(data_type: &DataType) -> bool {
    !data_type.is_nested()
}

/// Drops scalar columns that hold no value at all.
///
/// Returns the retained columns, in their original order, with the projected dataset.
#[instrument(skip_all)]
pub async fn remove_null_cols(df: DataFrame) -> Result<(Vec<Column>, DataFrame)> {
    let columns = all_columns(&df);
    let counted: Vec<(usize, String)> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| is_prunable_type(c.data_type()))
        .map(|(index, _)| (index, format!("__non_null_count_{index}")))
        .collect();
    let mut empty = HashSet::new();
    if !counted.is_empty() {
        let aggregates: Vec<Expr> = counted
            .iter()
            .map(|(index, alias)| count(columns[*index].expr()).alias(alias))
            .collect();
        let counts = df.clone().aggregate(vec![], aggregates)?.collect().await?;
        for (index, alias) in &counted {
            if single_row_i64(&counts, alias)? == 0 {
                empty.insert(*index);
            }
        }
    }
    let retained: Vec<&ColumnRef> = columns
        .iter()
        .enumerate()
        .filter(|(index, _)| !empty.contains(index))
        .map(|(_, c)| c)
        .collect();
    debug!(
        "pruning {} empty columns out of {}",
        empty.len(),
        columns.len()
    );
    let projection: Vec<Expr> = retained.iter().map(|c| c.expr()).collect();
    let pruned = df.select(projection)?;
    Ok((retained.into_iter().map(|c| c.column().clone()).collect(), pruned))
}

fn typed_null(name: &str, data_type: &DataType) -> Expr {
    cast(lit(ScalarValue::Null), data_type.clone()).alias(name)
}

/// Projects `df` onto `target`'s column order, filling columns it lacks with typed nulls.
fn align_to(df: DataFrame, target: &DFSchema) -> Result<DataFrame> {
    let projection = target
        .fields()
        .iter()
        .map(|field| {
            if has_column(df.schema(), field.name()) {
                Ok(ColumnRef::resolve(df.schema(), field.name())?
                    .expr()
                    .alias(field.name()))
            } else {
                Ok(typed_null(field.name(), field.data_type()))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(df.select(projection)?)
}

/// Unions two datasets by column name.
///
/// Each side gets a null column for every column only the other side has, typed like the side
/// that has it. The output keeps the columns of `a` first followed by the columns only `b` has.
/// Rows are never deduplicated.
pub fn union_with_missing_as_null(a: DataFrame, b: DataFrame) -> Result<DataFrame> {
    let mut fields: Vec<_> = a.schema().fields().iter().cloned().collect();
    let b_only: Vec<_> = b
        .schema()
        .fields()
        .iter()
        .filter(|f| !has_column(a.schema(), f.name()))
        .cloned()
        .collect();
    let a_only = fields
        .iter()
        .filter(|f| !has_column(b.schema(), f.name()))
        .count();
    debug!(
        "union: {} columns missing on the right, {} on the left",
        a_only,
        b_only.len()
    );
    fields.extend(b_only);
    let target = DFSchema::from_unqualified_fields(fields.into(), Default::default())?;
    let left = align_to(a, &target)?;
    let right = align_to(b, &target)?;
    Ok(left.union(right)?)
}

/// Left fold of [`union_with_missing_as_null`] over one or more datasets.
pub fn union_all_with_missing_as_null(datasets: Vec<DataFrame>) -> Result<DataFrame> {
    let mut it = datasets.into_iter();
    let first = it
        .next()
        .ok_or_else(|| Error::invalid_argument("union requires at least one dataset"))?;
    it.try_fold(first, union_with_missing_as_null)
}

/// Places `ordered_names` at the front, followed by the remaining columns in their original order.
///
/// Used so that storage engines which only collect statistics on the first columns of a table
/// cover the columns that matter for data skipping.
pub fn move_columns_to_front<S: AsRef<str>>(
    df: DataFrame,
    ordered_names: &[S],
) -> Result<DataFrame> {
    let front = ColumnRef::resolve_all(df.schema(), ordered_names)?;
    let front_names: HashSet<&str> = front.iter().map(|c| c.name()).collect();
    if front_names.len() != front.len() {
        return Err(Error::invalid_argument(
            "columns to move to the front must be distinct",
        ));
    }
    let rest: Vec<ColumnRef> = all_columns(&df)
        .into_iter()
        .filter(|c| !front_names.contains(c.name()))
        .collect();
    let projection: Vec<Expr> = front.iter().chain(rest.iter()).map(|c| c.expr()).collect();
    Ok(df.select(projection)?)
}

pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if INVALID_COLUMN_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Renames top-level columns so that they only contain characters accepted by table writers.
pub fn sanitize_column_names(df: DataFrame) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mut projection = vec![];
    for column in all_columns(&df) {
        let clean = sanitize_column_name(column.name());
        if !seen.insert(clean.clone()) {
            return Err(Error::invalid_argument(format!(
                "column {} collides with another column once renamed to {clean}",
                column.name()
            )));
        }
        if clean != column.name() {
            debug!("renaming column {} to {clean}", column.name());
        }
        projection.push(column.expr().alias(clean));
    }
    Ok(df.select(projection)?)
}
