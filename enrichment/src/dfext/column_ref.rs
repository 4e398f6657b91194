use crate::error::{Error, Result};
use datafusion::arrow::datatypes::{DataType, FieldRef};
use datafusion::common::{Column, DFSchema};
use datafusion::prelude::{DataFrame, Expr};

/// A column that was found in a specific dataset's schema.
///
/// Building one is the only way the transformations in this crate refer to columns, so an
/// unknown name is reported as `InvalidArgument` while the plan is built instead of surfacing
/// later as a planning error deep inside a window or union.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    column: Column,
    field: FieldRef,
}

impl ColumnRef {
    pub fn resolve(schema: &DFSchema, name: &str) -> Result<Self> {
        let (qualifier, field) = schema
            .qualified_field_with_unqualified_name(name)
            .map_err(|e| {
                Error::invalid_argument(format!(
                    "resolving column {name} in [{}]: {e}",
                    column_names(schema).join(", ")
                ))
            })?;
        Ok(Self {
            column: Column::new(qualifier.cloned(), field.name()),
            field: field.clone(),
        })
    }

    pub fn resolve_all<S: AsRef<str>>(schema: &DFSchema, names: &[S]) -> Result<Vec<Self>> {
        names
            .iter()
            .map(|name| Self::resolve(schema, name.as_ref()))
            .collect()
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn data_type(&self) -> &DataType {
        self.field.data_type()
    }

    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn expr(&self) -> Expr {
        Expr::Column(self.column.clone())
    }
}

pub fn column_names(schema: &DFSchema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Resolves every top-level column of the dataset, in schema order.
pub fn all_columns(df: &DataFrame) -> Vec<ColumnRef> {
    df.schema()
        .iter()
        .map(|(qualifier, field)| ColumnRef {
            column: Column::new(qualifier.cloned(), field.name()),
            field: field.clone(),
        })
        .collect()
}

pub fn has_column(schema: &DFSchema, name: &str) -> bool {
    schema.has_column_with_unqualified_name(name)
}
