use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::Column;
use tokio_postgres::types::{FromSql, Kind};

use crate::error::SqlUtilsError;
use crate::results::{Row, index_columns};
use crate::types::RowValues;

use super::wire::{PgInterval, PgNumeric, PgTimeTz, RawValue};

/// Convert fetched rows into [`Row`] mappings keyed by column name.
///
/// Column names come from the statement metadata so an empty result still knows its shape.
///
/// # Errors
/// Returns `SqlUtilsError::QueryError` if any column cannot be converted.
pub fn build_rows(
    columns: &[Column],
    rows: &[tokio_postgres::Row],
) -> Result<Vec<Row>, SqlUtilsError> {
    let column_names: Arc<Vec<String>> =
        Arc::new(columns.iter().map(|col| col.name().to_string()).collect());
    let column_index = Arc::new(index_columns(&column_names));

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(column_names.len());
        for idx in 0..column_names.len() {
            values.push(postgres_extract_value(row, idx)?);
        }
        out.push(Row::with_index(
            Arc::clone(&column_names),
            values,
            Arc::clone(&column_index),
        ));
    }
    Ok(out)
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
) -> Result<Option<T>, SqlUtilsError> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        let column = &row.columns()[idx];
        SqlUtilsError::QueryError(format!(
            "cannot read column \"{}\" of type {}: {e}",
            column.name(),
            column.type_().name()
        ))
    })
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// `numeric` keeps its exact decimal text. `timetz` and `interval` are rendered as text, as
/// are enums and the driver's other text-like types. Anything else comes back as the
/// column's raw bytes.
///
/// # Errors
/// Returns `SqlUtilsError::QueryError` if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, SqlUtilsError> {
    let type_info = row.columns()[idx].type_();

    let value = match type_info.name() {
        "int2" => get::<i16>(row, idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int4" => get::<i32>(row, idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int8" => get::<i64>(row, idx)?.map(RowValues::Int),
        "oid" => get::<u32>(row, idx)?.map(|v| RowValues::Int(i64::from(v))),
        "float4" => get::<f32>(row, idx)?.map(|v| RowValues::Float(f64::from(v))),
        "float8" => get::<f64>(row, idx)?.map(RowValues::Float),
        "bool" => get::<bool>(row, idx)?.map(RowValues::Bool),
        "timestamp" => get::<NaiveDateTime>(row, idx)?.map(RowValues::Timestamp),
        "timestamptz" => get::<DateTime<Utc>>(row, idx)?.map(RowValues::TimestampTz),
        "date" => get::<NaiveDate>(row, idx)?.map(RowValues::Date),
        "time" => get::<NaiveTime>(row, idx)?.map(RowValues::Time),
        "json" | "jsonb" => get::<Value>(row, idx)?.map(RowValues::JSON),
        "bytea" => get::<Vec<u8>>(row, idx)?.map(RowValues::Blob),
        "uuid" => get::<uuid::Uuid>(row, idx)?.map(|v| RowValues::Text(v.to_string())),
        "numeric" => get::<PgNumeric>(row, idx)?.map(|v| RowValues::Numeric(v.0)),
        "timetz" => get::<PgTimeTz>(row, idx)?.map(|v| RowValues::Text(v.0)),
        "interval" => get::<PgInterval>(row, idx)?.map(|v| RowValues::Text(v.0)),
        _ if <String as FromSql<'_>>::accepts(type_info) => {
            get::<String>(row, idx)?.map(RowValues::Text)
        }
        _ if matches!(type_info.kind(), Kind::Enum(_)) => get::<RawValue>(row, idx)?
            .map(|v| RowValues::Text(String::from_utf8_lossy(&v.0).into_owned())),
        _ => get::<RawValue>(row, idx)?.map(|v| RowValues::Blob(v.0)),
    };

    Ok(value.unwrap_or(RowValues::Null))
}
