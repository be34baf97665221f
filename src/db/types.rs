//! Row decoding into JSON records.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! Records produced here are what [`Entity::from_record`](crate::models::Entity)
//! deserializes, so numbers stay numbers and timestamps become ISO-8601 strings.

use crate::dialect::Dialect;
use crate::models::Record;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::Sqlite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // SQLite stores timestamps as text
    if dialect != Dialect::Sqlite
        && (lower.starts_with("timestamp") || lower == "datetime" || lower == "date")
    {
        return TypeCategory::Timestamp;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// DECIMAL/NUMERIC value kept in its textual database form.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        is_decimal_name(ty.name())
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::MySql>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        is_decimal_name(ty.name())
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::Postgres>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

fn is_decimal_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("decimal") || lower.contains("numeric")
}

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Non-finite floats have no JSON number form and are kept as text.
fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to Record
// =============================================================================

/// Conversion of a fetched row into a column-name keyed record.
pub trait RowToRecord {
    fn to_record(&self) -> Record;
}

impl RowToRecord for MySqlRow {
    fn to_record(&self) -> Record {
        record_from(self, Dialect::MySql, |row, idx, _, category| {
            mysql::decode_column(row, idx, category)
        })
    }
}

impl RowToRecord for PgRow {
    fn to_record(&self) -> Record {
        record_from(self, Dialect::PostgreSql, |row, idx, _, category| {
            postgres::decode_column(row, idx, category)
        })
    }
}

impl RowToRecord for SqliteRow {
    fn to_record(&self) -> Record {
        record_from(self, Dialect::Sqlite, sqlite::decode_column)
    }
}

fn record_from<R, F>(row: &R, dialect: Dialect, decode: F) -> Record
where
    R: Row,
    F: Fn(&R, usize, &str, TypeCategory) -> JsonValue,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, dialect);
            (col.name().to_string(), decode(row, idx, type_name, category))
        })
        .collect()
}

// =============================================================================
// Decoders
// =============================================================================

/// Column `idx` decoded as `T`; `None` for NULL or an incompatible type.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn or_null(value: Option<JsonValue>) -> JsonValue {
    value.unwrap_or(JsonValue::Null)
}

fn decimal<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    RawDecimal: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(value) => or_null(value.map(|d| JsonValue::String(d.0))),
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to decode decimal column");
            JsonValue::Null
        }
    }
}

fn float<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
{
    or_null(
        get::<R, f64>(row, idx)
            .or_else(|| get::<R, f32>(row, idx).map(f64::from))
            .map(float_value),
    )
}

fn binary<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    or_null(get::<R, Vec<u8>>(row, idx).map(|v| encode_binary_value(&v)))
}

fn timestamp<'r, R>(row: &'r R, idx: usize) -> JsonValue
where
    R: Row,
    usize: ColumnIndex<R>,
    NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
{
    let text = get::<R, NaiveDateTime>(row, idx)
        .map(|v| v.format(TIMESTAMP_FORMAT).to_string())
        .or_else(|| get::<R, DateTime<Utc>>(row, idx).map(|v| v.to_rfc3339()))
        .or_else(|| get::<R, NaiveDate>(row, idx).map(|v| v.to_string()));
    or_null(text.map(JsonValue::String))
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decimal(row, idx),
            TypeCategory::Integer => integer(row, idx),
            TypeCategory::Boolean => or_null(get::<_, bool>(row, idx).map(JsonValue::Bool)),
            TypeCategory::Float => float(row, idx),
            TypeCategory::Binary => binary(row, idx),
            TypeCategory::Json => or_null(get::<_, JsonValue>(row, idx)),
            TypeCategory::Timestamp => timestamp(row, idx),
            _ => text(row, idx),
        }
    }

    // sqlx only decodes MySQL integers into the exact width and signedness
    fn integer(row: &MySqlRow, idx: usize) -> JsonValue {
        let value = get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i8>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, u32>(row, idx).map(JsonValue::from));
        or_null(value)
    }

    fn text(row: &MySqlRow, idx: usize) -> JsonValue {
        let value = get::<_, String>(row, idx)
            // information_schema reports some text columns as binary
            .or_else(|| {
                get::<_, Vec<u8>>(row, idx).map(|v| String::from_utf8_lossy(&v).into_owned())
            });
        or_null(value.map(JsonValue::String))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decimal(row, idx),
            TypeCategory::Integer => integer(row, idx),
            TypeCategory::Boolean => or_null(get::<_, bool>(row, idx).map(JsonValue::Bool)),
            TypeCategory::Float => float(row, idx),
            TypeCategory::Binary => binary(row, idx),
            TypeCategory::Json => or_null(get::<_, JsonValue>(row, idx)),
            TypeCategory::Timestamp => timestamp(row, idx),
            _ => or_null(get::<_, String>(row, idx).map(JsonValue::String)),
        }
    }

    fn integer(row: &PgRow, idx: usize) -> JsonValue {
        let value = get::<_, i32>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, i64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, i16>(row, idx).map(JsonValue::from));
        or_null(value)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Integer => or_null(get::<_, i64>(row, idx).map(JsonValue::from)),
            TypeCategory::Boolean => or_null(get::<_, bool>(row, idx).map(JsonValue::Bool)),
            TypeCategory::Float | TypeCategory::Decimal => {
                or_null(get::<_, f64>(row, idx).map(float_value))
            }
            TypeCategory::Binary => binary(row, idx),
            _ => text(row, idx, type_name),
        }
    }

    fn text(row: &SqliteRow, idx: usize, type_name: &str) -> JsonValue {
        if let Some(v) = get::<_, String>(row, idx) {
            if type_name.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        // Expression columns carry no declared type; fall back to the stored value
        let value = get::<_, i64>(row, idx)
            .map(JsonValue::from)
            .or_else(|| get::<_, f64>(row, idx).map(float_value));
        or_null(value)
    }
}
