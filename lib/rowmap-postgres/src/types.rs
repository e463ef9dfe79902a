//! Conversions between rowmap values and PostgreSQL arguments and rows.

use chrono::{DateTime, NaiveDateTime, Utc};
use rowmap::{Row as RowmapRow, Value};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgRow, PgTypeInfo};
use sqlx::{Arguments, Column, Postgres, Row, TypeInfo};

/// A NULL parameter with no declared type, so the server infers it from
/// context instead of rejecting e.g. a text NULL for an integer column.
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind values to PgArguments in placeholder order.
pub(crate) fn bind_values(params: &[Value]) -> Result<PgArguments, BoxDynError> {
    let mut args = PgArguments::default();
    for value in params {
        match value {
            Value::Null => args.add(UntypedNull)?,
            Value::Bool(b) => args.add(*b)?,
            Value::Int(n) => args.add(*n)?,
            Value::Float(n) => args.add(*n)?,
            Value::String(s) => args.add(s.as_str())?,
            Value::Strings(v) => args.add(v.as_slice())?,
            Value::Datetime(dt) => args.add(*dt)?,
            Value::Json(json) => args.add(json.clone())?,
        }
    }
    Ok(args)
}

/// Decode a row by PostgreSQL type name.
pub(crate) fn decode_row(row: &PgRow) -> Result<RowmapRow, sqlx::Error> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for column in row.columns() {
        columns.push(column.name().to_string());
        values.push(decode_column(row, column.ordinal(), column.type_info().name())?);
    }

    Ok(RowmapRow::new(columns, values))
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        "OID" => row
            .try_get::<Option<Oid>, _>(idx)?
            .map(|oid| Value::Int(i64::from(oid.0))),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(Value::Datetime),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|dt| Value::Datetime(dt.and_utc())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(Value::Json),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => row
            .try_get::<Option<Vec<String>>, _>(idx)?
            .map(Value::Strings),
        "VOID" => None,
        // TEXT, VARCHAR, CHAR and NAME. Other types (UUID, NUMERIC, DATE) fail to decode.
        _ => row.try_get::<Option<String>, _>(idx)?.map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}
