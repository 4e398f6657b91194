/// Column handles resolved against a dataset's schema
pub mod column_ref;
/// Typed access to the columns of collected record batches
pub mod typed_column;
