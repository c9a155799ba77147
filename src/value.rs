// ABOUTME: Scalar values moved between stores, and their driver conversions
// ABOUTME: Covers PostgreSQL and SQLite binding, bool normalization, and literal rendering

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

/// One row of a page, positionally aligned with the page's column list.
pub type Row = Vec<Value>;

/// A single scalar read from one store and bound into another.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Time(NaiveTime),
    Json(serde_json::Value),
    /// A PostgreSQL value of a type with no variant of its own (interval,
    /// inet, enums, arrays, ...), kept as its binary wire encoding.
    Raw { ty: Type, bytes: Vec<u8> },
}

impl Value {
    /// Booleans are bound as the integers 0/1.
    ///
    /// Every other value passes through unchanged.
    pub fn normalized_for_bind(&self) -> Value {
        match self {
            Value::Bool(b) => Value::Int(i64::from(*b)),
            other => other.clone(),
        }
    }

    /// True for values whose textual rendering is a plain numeric literal.
    pub fn is_numeric_literal(&self) -> bool {
        match self {
            Value::Int(_) | Value::Decimal(_) => true,
            Value::Float(f) => f.is_finite(),
            _ => false,
        }
    }
}

/// Plain textual rendering, as embedded into relation child queries.
///
/// Nothing is quoted or escaped: text is written verbatim.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", i64::from(*b)),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write_hex(f, b),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::TimestampTz(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Time(t) => write!(f, "{}", t),
            Value::Json(j) => write!(f, "{}", j),
            Value::Raw { ty, bytes } => match enum_label(ty, bytes) {
                Some(label) => write!(f, "{}", label),
                None => write_hex(f, bytes),
            },
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "\\x")?;
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

/// Enum values travel as their label text in binary format too.
fn enum_label<'a>(ty: &Type, bytes: &'a [u8]) -> Option<&'a str> {
    match ty.kind() {
        Kind::Enum(_) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(v: rusqlite::types::Value) -> Self {
        match v {
            rusqlite::types::Value::Null => Value::Null,
            rusqlite::types::Value::Integer(i) => Value::Int(i),
            rusqlite::types::Value::Real(f) => Value::Float(f),
            rusqlite::types::Value::Text(s) => Value::Text(s),
            rusqlite::types::Value::Blob(b) => Value::Bytes(b),
        }
    }
}

impl rusqlite::types::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value as SqliteValue};

        let value = match self {
            Value::Null => SqliteValue::Null,
            Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
            Value::Int(i) => SqliteValue::Integer(*i),
            Value::Float(f) => SqliteValue::Real(*f),
            Value::Bytes(b) => SqliteValue::Blob(b.clone()),
            Value::Text(s) => SqliteValue::Text(s.clone()),
            Value::Raw { ty, bytes } if enum_label(ty, bytes).is_none() => {
                SqliteValue::Blob(bytes.clone())
            }
            // SQLite has no native type for these; store their canonical text
            other => SqliteValue::Text(other.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

/// Binds a value against whatever type PostgreSQL inferred for the parameter.
///
/// Integers are narrowed or widened to the parameter type, and bound into
/// boolean columns as `value != 0`. Text is parsed into numeric, temporal,
/// uuid and json parameter types, and rejected by any other non-text type.
/// Raw values are only written back into a parameter of their own type.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => Value::Int(i64::from(*b)).to_sql(ty, out),
            },
            Value::Int(i) => match *ty {
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                    i.to_string().to_sql(ty, out)
                }
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Decimal(d) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => d.to_string().to_sql(ty, out),
                _ => d.to_sql(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::BOOL => matches!(s.as_str(), "1" | "t" | "true").to_sql(ty, out),
                Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
                Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
                Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
                Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
                Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
                Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
                Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                Type::DATE => {
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out)
                }
                Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => parse_timestamptz(s)?.to_sql(ty, out),
                Type::TIME => {
                    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out)
                }
                _ if is_text_type(ty) => s.as_str().to_sql(ty, out),
                _ => Err(format!("cannot bind text '{}' to a parameter of type {}", s, ty)
                    .into()),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Timestamp(t) => t.to_sql(ty, out),
            Value::TimestampTz(t) => t.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::Json(j) => j.to_sql(ty, out),
            Value::Raw { ty: source, bytes } => {
                let same_type = source.oid() == ty.oid()
                    || (source.name() == ty.name() && source.schema() == ty.schema());
                if !same_type && !(enum_label(source, bytes).is_some() && is_text_type(ty)) {
                    return Err(format!(
                        "cannot bind a {} value to a parameter of type {}",
                        source, ty
                    )
                    .into());
                }
                out.extend_from_slice(bytes);
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Parameter types whose binary format is the UTF-8 text itself.
fn is_text_type(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_))
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// RFC 3339, PostgreSQL's `2024-01-31 10:00:00+02` form, or a bare
/// timestamp taken as UTC.
fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| parse_timestamp(s).map(|t| t.and_utc()))
}

/// Any PostgreSQL value, captured as its type and binary encoding.
struct RawValue {
    ty: Type,
    bytes: Vec<u8>,
}

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawValue {
            ty: ty.clone(),
            bytes: raw.to_vec(),
        })
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decode column `idx` of a PostgreSQL row into a [`Value`].
///
/// Text-compatible types are read as text. Types outside the known set are
/// kept as [`Value::Raw`] and written back unchanged.
pub fn value_from_pg_row(row: &tokio_postgres::Row, idx: usize) -> Result<Value, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| Value::Int(i64::from(v))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(Value::Decimal),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::TimestampTz),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time),
        ref other if <String as FromSql>::accepts(other) => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        _ => row
            .try_get::<_, Option<RawValue>>(idx)?
            .map(|raw| Value::Raw {
                ty: raw.ty,
                bytes: raw.bytes,
            }),
    };
    Ok(value.unwrap_or(Value::Null))
}
