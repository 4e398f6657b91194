use crate::dfext::column_ref::{ColumnRef, all_columns, has_column};
use crate::error::{Error, Result};
use crate::schema_tools::union_with_missing_as_null;
use datafusion::functions_window::expr_fn::last_value;
use datafusion::logical_expr::expr::NullTreatment;
use datafusion::logical_expr::{ExprFunctionExt, WindowFrame, WindowFrameBound, WindowFrameUnits};
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Partition and ordering of the rows a forward fill looks back over.
///
/// The first `order_by` column is the time key; additional columns break ties between rows that
/// share a timestamp. Without them the row picked among ties is left to the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
}

impl WindowSpec {
    pub fn new(partition_by: &[&str], order_by: &str) -> Self {
        Self {
            partition_by: partition_by.iter().map(|s| s.to_string()).collect(),
            order_by: vec![order_by.to_string()],
        }
    }

    pub fn then_by(mut self, tiebreaker: &str) -> Self {
        self.order_by.push(tiebreaker.to_string());
        self
    }

    fn validate(&self, df: &DataFrame) -> Result<(Vec<ColumnRef>, Vec<ColumnRef>)> {
        if self.order_by.is_empty() {
            return Err(Error::invalid_argument(
                "window spec requires at least one ordering column",
            ));
        }
        let partition = ColumnRef::resolve_all(df.schema(), &self.partition_by)?;
        let order = ColumnRef::resolve_all(df.schema(), &self.order_by)?;
        Ok((partition, order))
    }
}

/// Static arguments of [`fill_from_lookups_by_ts`], as carried in pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSpec {
    pub anchor_column: String,
    pub columns_to_fill: Vec<String>,
    pub window: WindowSpec,
}

impl FillSpec {
    pub fn apply(&self, primary: DataFrame, lookups: Vec<DataFrame>) -> Result<DataFrame> {
        fill_from_lookups_by_ts(
            primary,
            &self.anchor_column,
            &self.columns_to_fill,
            &self.window,
            lookups,
        )
    }
}

/// rows from the start of the partition up to and including the current row
fn running_frame() -> WindowFrame {
    WindowFrame::new_bounds(
        WindowFrameUnits::Rows,
        WindowFrameBound::Preceding(ScalarValue::UInt64(None)),
        WindowFrameBound::CurrentRow,
    )
}

/// Replaces the values of each column with the last non-null value seen at or before the row
/// within its partition.
///
/// All the fill expressions are computed in a single window pass over the same input, so a
/// filled column never feeds the fill of another one. Rows with no earlier value stay null.
pub fn fill_forward<S: AsRef<str>>(
    df: DataFrame,
    columns_to_fill: &[S],
    window: &WindowSpec,
) -> Result<DataFrame> {
    let (partition, order) = window.validate(&df)?;
    let targets = ColumnRef::resolve_all(df.schema(), columns_to_fill)?;
    if targets.is_empty() {
        return Ok(df);
    }
    let partition_exprs: Vec<Expr> = partition.iter().map(|c| c.expr()).collect();
    let sort_exprs: Vec<_> = order.iter().map(|c| c.expr().sort(true, true)).collect();

    let mut filled_aliases = HashMap::new();
    let mut window_exprs = vec![];
    for (index, target) in targets.iter().enumerate() {
        let alias = format!("__filled_{index}");
        let expr = last_value(target.expr())
            .partition_by(partition_exprs.clone())
            .order_by(sort_exprs.clone())
            .window_frame(running_frame())
            .null_treatment(NullTreatment::IgnoreNulls)
            .build()?
            .alias(&alias);
        window_exprs.push(expr);
        filled_aliases.insert(target.name().to_string(), alias);
    }

    let original = all_columns(&df);
    let windowed = df.window(window_exprs)?;
    let projection: Vec<Expr> = original
        .iter()
        .map(|c| match filled_aliases.get(c.name()) {
            Some(alias) => ident(alias).alias(c.name()),
            None => c.expr(),
        })
        .collect();
    Ok(windowed.select(projection)?)
}

/// Backfills slowly-changing columns of `primary` from one or more lookup datasets.
///
/// The lookups are unioned into the primary rows by column name, every column to fill is
/// forward filled over `window`, and only rows with a non-null `anchor_column` are kept. Lookup
/// rows must leave the anchor null for them to be dropped.
#[instrument(skip_all, fields(anchor = anchor_column))]
pub fn fill_from_lookups_by_ts<S: AsRef<str>>(
    primary: DataFrame,
    anchor_column: &str,
    columns_to_fill: &[S],
    window: &WindowSpec,
    lookups: Vec<DataFrame>,
) -> Result<DataFrame> {
    if lookups.is_empty() {
        return Err(Error::invalid_argument(
            "filling from lookups requires at least one lookup dataset",
        ));
    }
    ColumnRef::resolve(primary.schema(), anchor_column)?;
    for (index, lookup) in lookups.iter().enumerate() {
        if has_column(lookup.schema(), anchor_column) {
            warn!(
                "lookup {index} has anchor column {anchor_column}: its non-null rows will be kept"
            );
        }
    }
    info!(
        "filling {} columns from {} lookups",
        columns_to_fill.len(),
        lookups.len()
    );
    let mut combined = primary;
    for lookup in lookups {
        combined = union_with_missing_as_null(combined, lookup)?;
    }
    let filled = fill_forward(combined, columns_to_fill, window)?;
    let anchor = ColumnRef::resolve(filled.schema(), anchor_column)?;
    Ok(filled.filter(anchor.expr().is_not_null())?)
}
