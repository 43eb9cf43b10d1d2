use std::error::Error;

use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::RowValues;

use super::wire::encode_numeric;

/// Container for Postgres parameters with lifetime tracking
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    /// Convert from a slice of RowValues to Postgres parameters
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let references: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

impl RowValues {
    // Text rendering used when the server asks for a text parameter, e.g. `SELECT $1`
    // with no other type context.
    fn to_text_param(&self) -> Option<String> {
        match self {
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Numeric(n) => Some(n.clone()),
            RowValues::Bool(b) => Some(b.to_string()),
            RowValues::Timestamp(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            RowValues::TimestampTz(dt) => Some(dt.to_rfc3339()),
            RowValues::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            RowValues::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            RowValues::JSON(v) => Some(v.to_string()),
            RowValues::Text(_) | RowValues::Null | RowValues::Blob(_) => None,
        }
    }

    // Decimal text for a `numeric` parameter.
    fn to_numeric_param(&self) -> Option<String> {
        match self {
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) if f.is_nan() => Some("NaN".to_string()),
            RowValues::Float(f) if f.is_infinite() => {
                Some(if *f > 0.0 { "Infinity" } else { "-Infinity" }.to_string())
            }
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Numeric(n) | RowValues::Text(n) => Some(n.clone()),
            _ => None,
        }
    }
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if is_text_type(ty) {
            if let Some(text) = self.to_text_param() {
                return text.to_sql(ty, out);
            }
        }
        if *ty == Type::NUMERIC {
            if let Some(text) = self.to_numeric_param() {
                encode_numeric(&text, out)?;
                return Ok(IsNull::No);
            }
        }

        match self {
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => (*f).to_sql(ty, out),
            },
            RowValues::Numeric(n) => match *ty {
                Type::FLOAT4 | Type::FLOAT8 => {
                    let value: f64 = n.parse()?;
                    RowValues::Float(value).to_sql(ty, out)
                }
                _ => Err(format!("cannot bind numeric {n:?} to a {ty} parameter").into()),
            },
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::TimestampTz(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Date(d) => d.to_sql(ty, out),
            RowValues::Time(t) => t.to_sql(ty, out),
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        // Only accept types we can properly handle
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::TIME
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}
