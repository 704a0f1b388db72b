//! Row value decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Engine-specific decoders handle the actual value extraction
//!
//! SQLite is the exception: its declared column types are advisory, so values
//! are decoded by the storage class each value actually carries.

use crate::models::{ColumnMetadata, EngineType};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use mongodb::bson::Bson;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

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
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Classify an engine type name into a logical category.
pub fn categorize_type(type_name: &str, engine: EngineType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        if engine == EngineType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "timestamptz" || lower == "timestamp with time zone" {
        return TypeCategory::TimestampTz;
    }
    if lower.starts_with("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" || lower == "time without time zone" {
        return TypeCategory::Time;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// Preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary values are returned base64-encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Converts driver rows into JSON records.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $engine:expr, $decoder:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let type_name = col.type_info().name();
                        let category = categorize_type(type_name, $engine);
                        (col.name().to_string(), $decoder(self, idx, category))
                    })
                    .collect()
            }

            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
                    .collect()
            }
        }
    };
}

impl_row_to_json!(PgRow, EngineType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(MySqlRow, EngineType::MySQL, mysql::decode_column);
impl_row_to_json!(SqliteRow, EngineType::SQLite, sqlite::decode_column);

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(v) => v.map(|d| JsonValue::String(d.0)).unwrap_or(JsonValue::Null),
                Err(e) => {
                    tracing::warn!(column = idx, error = %e, "Failed to decode NUMERIC");
                    JsonValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => get::<bool>(row, idx).map(JsonValue::Bool).unwrap_or_default(),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => get::<Vec<u8>>(row, idx)
                .map(|v| encode_binary(&v))
                .unwrap_or_default(),
            TypeCategory::Json => get::<JsonValue>(row, idx).unwrap_or_default(),
            TypeCategory::TimestampTz => get::<DateTime<Utc>>(row, idx)
                .map(|v| JsonValue::String(v.to_rfc3339()))
                .unwrap_or_default(),
            TypeCategory::Timestamp => get::<NaiveDateTime>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Date => get::<NaiveDate>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Time => get::<NaiveTime>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Text | TypeCategory::Uuid | TypeCategory::Unknown => {
                decode_text(row, idx)
            }
        }
    }

    fn get<T>(row: &PgRow, idx: usize) -> Option<T>
    where
        T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(idx).ok().flatten()
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<i16>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = get::<i32>(row, idx) {
            return JsonValue::Number(v.into());
        }
        get::<i64>(row, idx)
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or_default()
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<f64>(row, idx) {
            return float_value(v);
        }
        get::<f32>(row, idx)
            .map(|v| float_value(v as f64))
            .unwrap_or_default()
    }

    /// Text, then the raw representation for types without a Rust mapping
    /// (uuid, inet, enums, ...).
    fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<String>(row, idx) {
            return JsonValue::String(v);
        }
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v),
            _ => JsonValue::Null,
        }
    }
}

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(v) => v.map(|d| JsonValue::String(d.0)).unwrap_or(JsonValue::Null),
                Err(e) => {
                    tracing::warn!(column = idx, error = %e, "Failed to decode DECIMAL");
                    JsonValue::Null
                }
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => get::<bool>(row, idx).map(JsonValue::Bool).unwrap_or_default(),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => get::<Vec<u8>>(row, idx)
                .map(|v| encode_binary(&v))
                .unwrap_or_default(),
            TypeCategory::Json => get::<JsonValue>(row, idx).unwrap_or_default(),
            TypeCategory::Timestamp | TypeCategory::TimestampTz => get::<NaiveDateTime>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Date => get::<NaiveDate>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Time => get::<NaiveTime>(row, idx)
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or_default(),
            TypeCategory::Text | TypeCategory::Uuid | TypeCategory::Unknown => {
                decode_text(row, idx)
            }
        }
    }

    fn get<T>(row: &MySqlRow, idx: usize) -> Option<T>
    where
        T: for<'r> Decode<'r, sqlx::MySql> + Type<sqlx::MySql>,
    {
        row.try_get::<Option<T>, _>(idx).ok().flatten()
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<i64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = get::<i32>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(v) = get::<i8>(row, idx) {
            return JsonValue::Number(v.into());
        }
        // BIGINT UNSIGNED
        get::<u64>(row, idx)
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or_default()
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<f64>(row, idx) {
            return float_value(v);
        }
        get::<f32>(row, idx)
            .map(|v| float_value(v as f64))
            .unwrap_or_default()
    }

    /// Text; binary-collated strings come back as bytes.
    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Some(v) = get::<String>(row, idx) {
            return JsonValue::String(v);
        }
        match get::<Vec<u8>>(row, idx) {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(s) => JsonValue::String(s),
                Err(e) => encode_binary(e.as_bytes()),
            },
            None => JsonValue::Null,
        }
    }
}

mod sqlite {
    use super::*;

    /// Decode by the value's storage class; the declared type is ignored.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        let storage_class = match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return JsonValue::Null,
            Ok(value) => value.type_info().name().to_uppercase(),
            Err(_) => return JsonValue::Null,
        };

        match storage_class.as_str() {
            "INTEGER" | "BOOLEAN" => match row.try_get::<i64, _>(idx) {
                Ok(v) if category == TypeCategory::Boolean => JsonValue::Bool(v != 0),
                Ok(v) => JsonValue::Number(v.into()),
                Err(_) => JsonValue::Null,
            },
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or_default(),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| encode_binary(&v))
                .unwrap_or_default(),
            _ => match row.try_get::<String, _>(idx) {
                Ok(v) if category == TypeCategory::Json => {
                    serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
                }
                Ok(v) => JsonValue::String(v),
                Err(_) => JsonValue::Null,
            },
        }
    }
}

/// BSON value to relaxed extended JSON.
pub fn bson_to_json(value: &Bson) -> JsonValue {
    value.clone().into_relaxed_extjson()
}

/// Human-readable BSON type name, used as the inferred column type.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null | Bson::Undefined => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};

    #[test]
    fn test_categorize_integer_types() {
        assert_eq!(categorize_type("INT4", EngineType::PostgreSQL), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", EngineType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT", EngineType::MySQL), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_decimal_per_engine() {
        assert_eq!(categorize_type("NUMERIC", EngineType::PostgreSQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("numeric", EngineType::SQLite), TypeCategory::Float);
    }

    #[test]
    fn test_categorize_temporal_types() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", EngineType::PostgreSQL),
            TypeCategory::TimestampTz
        );
        assert_eq!(categorize_type("DATETIME", EngineType::MySQL), TypeCategory::Timestamp);
        assert_eq!(categorize_type("DATE", EngineType::PostgreSQL), TypeCategory::Date);
        assert_eq!(categorize_type("TIME", EngineType::MySQL), TypeCategory::Time);
    }

    #[test]
    fn test_categorize_text_and_unknown() {
        assert_eq!(categorize_type("VARCHAR", EngineType::MySQL), TypeCategory::Text);
        assert_eq!(categorize_type("INET", EngineType::PostgreSQL), TypeCategory::Unknown);
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(b"hello world"), JsonValue::String("aGVsbG8gd29ybGQ=".into()));
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_non_finite_float_becomes_string() {
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".into()));
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }

    #[test]
    fn test_bson_type_names() {
        let document = doc! {
            "_id": ObjectId::new(),
            "name": "widget",
            "qty": 3_i32,
            "tags": ["a", "b"],
        };
        assert_eq!(bson_type_name(document.get("_id").unwrap()), "objectId");
        assert_eq!(bson_type_name(document.get("name").unwrap()), "string");
        assert_eq!(bson_type_name(document.get("qty").unwrap()), "int");
        assert_eq!(bson_type_name(document.get("tags").unwrap()), "array");
        assert_eq!(bson_to_json(document.get("qty").unwrap()), serde_json::json!(3));
    }
}
