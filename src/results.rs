mod row;

pub(crate) use row::index_columns;
pub use row::Row;
