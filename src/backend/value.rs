use std::fmt;
use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlbridge_client::protocol::{BigDecimal, BigInteger, ParameterType};

/// A value as produced by a backend cursor.
///
/// The set is closed: every variant maps to exactly one wire encoding.
pub enum NativeValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    BigInt(BigInteger),
    Decimal(BigDecimal),
    Date(NaiveDate),
    /// Time of day; always encoded as milliseconds since midnight
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Text(String),
    /// Character stream, read to the end when encoded
    Clob(Box<dyn Read + Send>),
    /// Byte stream, read to the end when encoded
    Blob(Box<dyn Read + Send>),
    Bytes(Vec<u8>),
    Array(Vec<NativeValue>),
    /// Backend value with no dedicated representation, as its default rendering
    Other(String),
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Null => write!(f, "Null"),
            NativeValue::Bool(v) => write!(f, "Bool({})", v),
            NativeValue::I8(v) => write!(f, "I8({})", v),
            NativeValue::I16(v) => write!(f, "I16({})", v),
            NativeValue::I32(v) => write!(f, "I32({})", v),
            NativeValue::I64(v) => write!(f, "I64({})", v),
            NativeValue::F32(v) => write!(f, "F32({})", v),
            NativeValue::F64(v) => write!(f, "F64({})", v),
            NativeValue::Char(v) => write!(f, "Char({:?})", v),
            NativeValue::BigInt(v) => write!(f, "BigInt({})", v),
            NativeValue::Decimal(v) => write!(f, "Decimal({})", v),
            NativeValue::Date(v) => write!(f, "Date({})", v),
            NativeValue::Time(v) => write!(f, "Time({})", v),
            NativeValue::Timestamp(v) => write!(f, "Timestamp({})", v),
            NativeValue::Text(v) => write!(f, "Text({:?})", v),
            NativeValue::Clob(_) => write!(f, "Clob(..)"),
            NativeValue::Blob(_) => write!(f, "Blob(..)"),
            NativeValue::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            NativeValue::Array(v) => f.debug_tuple("Array").field(v).finish(),
            NativeValue::Other(v) => write!(f, "Other({:?})", v),
        }
    }
}

pub type NativeRow = Vec<NativeValue>;

/// A statement parameter after parsing its text form
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Decimal(BigDecimal),
}

const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl BoundValue {
    /// Parse `text` according to the declared parameter type.
    ///
    /// Only floating point text may carry surrounding whitespace.
    pub fn parse(param_type: ParameterType, text: &str) -> Result<Self, String> {
        let invalid = |kind: &str| format!("cannot parse '{}' as {}", text, kind);

        Ok(match param_type {
            ParameterType::Null => BoundValue::Null,
            ParameterType::String => BoundValue::Text(text.to_string()),
            ParameterType::Boolean => BoundValue::Bool(text.eq_ignore_ascii_case("true")),
            ParameterType::Short => BoundValue::I16(text.parse().map_err(|_| invalid("SHORT"))?),
            ParameterType::Int => BoundValue::I32(text.parse().map_err(|_| invalid("INT"))?),
            ParameterType::Long => BoundValue::I64(text.parse().map_err(|_| invalid("LONG"))?),
            ParameterType::Float => {
                BoundValue::F32(text.trim().parse().map_err(|_| invalid("FLOAT"))?)
            }
            ParameterType::Double => {
                BoundValue::F64(text.trim().parse().map_err(|_| invalid("DOUBLE"))?)
            }
            ParameterType::Decimal => {
                BoundValue::Decimal(text.parse().map_err(|_| invalid("DECIMAL"))?)
            }
            ParameterType::Date => BoundValue::Date(
                NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid("DATE"))?,
            ),
            ParameterType::Time => BoundValue::Time(
                NaiveTime::parse_from_str(text, TIME_FORMAT).map_err(|_| invalid("TIME"))?,
            ),
            ParameterType::Timestamp => BoundValue::Timestamp(
                TIMESTAMP_FORMATS
                    .iter()
                    .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
                    .ok_or_else(|| invalid("TIMESTAMP"))?,
            ),
        })
    }
}
