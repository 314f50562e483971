//! Row value format used inside `Response::Chunk`.
//!
//! A frame is a concatenation of rows; a row is one tagged value per column:
//! `[tag: u8][payload]`. Fixed-width payloads are little-endian; variable
//! payloads carry an `i32` little-endian length prefix.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use super::bignum::{BigDecimal, BigInteger};
use super::error::BridgeError;

/// Value tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    Null = 0,
    Text = 1,
    Byte = 2,
    Short = 3,
    Integer = 4,
    Long = 5,
    Float = 6,
    Double = 7,
    Char = 8,
    Boolean = 9,
    BigInteger = 10,
    BigDecimal = 11,
    Date = 12,
    Time = 13,
    DateTime = 14,
    Binary = 15,
    Unknown = 16,
}

impl TryFrom<u8> for ItemType {
    type Error = BridgeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0 => ItemType::Null,
            1 => ItemType::Text,
            2 => ItemType::Byte,
            3 => ItemType::Short,
            4 => ItemType::Integer,
            5 => ItemType::Long,
            6 => ItemType::Float,
            7 => ItemType::Double,
            8 => ItemType::Char,
            9 => ItemType::Boolean,
            10 => ItemType::BigInteger,
            11 => ItemType::BigDecimal,
            12 => ItemType::Date,
            13 => ItemType::Time,
            14 => ItemType::DateTime,
            15 => ItemType::Binary,
            16 => ItemType::Unknown,
            other => {
                return Err(BridgeError::EncodingError(format!(
                    "unknown value tag {}",
                    other
                )))
            }
        })
    }
}

/// A decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Boolean(bool),
    BigInteger(BigInteger),
    BigDecimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
    /// Backend type without a dedicated tag, in its default text rendering
    Unknown(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) | SqlValue::Unknown(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Byte(v) => Some(*v as i64),
            SqlValue::Short(v) => Some(*v as i64),
            SqlValue::Int(v) => Some(*v as i64),
            SqlValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// Milliseconds since the Unix epoch for a UTC datetime
pub fn datetime_to_millis(value: &NaiveDateTime) -> i64 {
    value.and_utc().timestamp_millis()
}

pub fn date_to_millis(value: &NaiveDate) -> i64 {
    datetime_to_millis(&value.and_time(NaiveTime::MIN))
}

/// Milliseconds since midnight (a time on 1970-01-01)
pub fn time_to_millis(value: &NaiveTime) -> i64 {
    (*value - NaiveTime::MIN).num_milliseconds()
}

fn millis_to_datetime(millis: i64) -> Result<NaiveDateTime, BridgeError> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| BridgeError::EncodingError(format!("timestamp {} out of range", millis)))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: &'a mut usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], BridgeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                BridgeError::EncodingError(format!(
                    "truncated value: need {} bytes at offset {}",
                    len, self.pos
                ))
            })?;
        let slice = &self.data[*self.pos..end];
        *self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BridgeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32, BridgeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, BridgeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8], BridgeError> {
        let len = self.i32()?;
        if len < 0 {
            return Err(BridgeError::EncodingError(format!(
                "negative length {}",
                len
            )));
        }
        self.take(len as usize)
    }

    fn utf8(&mut self) -> Result<String, BridgeError> {
        let bytes = self.length_prefixed()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BridgeError::EncodingError(format!("invalid UTF-8 text: {}", e)))
    }
}

/// Decode one value starting at `*pos`, advancing `pos` past it
pub fn decode_value(data: &[u8], pos: &mut usize) -> Result<SqlValue, BridgeError> {
    let mut reader = Reader { data, pos };
    let tag = ItemType::try_from(reader.array::<1>()?[0])?;

    Ok(match tag {
        ItemType::Null => SqlValue::Null,
        ItemType::Text => SqlValue::Text(reader.utf8()?),
        ItemType::Byte => SqlValue::Byte(i8::from_le_bytes(reader.array()?)),
        ItemType::Short => SqlValue::Short(i16::from_le_bytes(reader.array()?)),
        ItemType::Integer => SqlValue::Int(reader.i32()?),
        ItemType::Long => SqlValue::Long(reader.i64()?),
        ItemType::Float => SqlValue::Float(f32::from_le_bytes(reader.array()?)),
        ItemType::Double => SqlValue::Double(f64::from_le_bytes(reader.array()?)),
        ItemType::Char => {
            let unit = u16::from_le_bytes(reader.array()?);
            let ch = char::from_u32(unit as u32).ok_or_else(|| {
                BridgeError::EncodingError(format!("invalid char code unit {:#06x}", unit))
            })?;
            SqlValue::Char(ch)
        }
        ItemType::Boolean => SqlValue::Boolean(reader.array::<1>()?[0] != 0),
        ItemType::BigInteger => {
            SqlValue::BigInteger(BigInteger::from_signed_bytes_be(reader.length_prefixed()?))
        }
        ItemType::BigDecimal => {
            let scale = reader.i32()?;
            let unscaled = BigInteger::from_signed_bytes_be(reader.length_prefixed()?);
            SqlValue::BigDecimal(BigDecimal::new(unscaled, scale))
        }
        ItemType::Date => SqlValue::Date(millis_to_datetime(reader.i64()?)?.date()),
        ItemType::Time => {
            let millis = reader.i64()?;
            let time = NaiveTime::MIN
                .overflowing_add_signed(TimeDelta::milliseconds(millis))
                .0;
            SqlValue::Time(time)
        }
        ItemType::DateTime => SqlValue::DateTime(millis_to_datetime(reader.i64()?)?),
        ItemType::Binary => SqlValue::Binary(reader.length_prefixed()?.to_vec()),
        ItemType::Unknown => SqlValue::Unknown(reader.utf8()?),
    })
}

/// Decode one row of `columns` values starting at `*pos`
pub fn decode_row(
    data: &[u8],
    pos: &mut usize,
    columns: usize,
) -> Result<Vec<SqlValue>, BridgeError> {
    let mut row = Vec::with_capacity(columns);
    for _ in 0..columns {
        row.push(decode_value(data, pos)?);
    }
    Ok(row)
}

/// Iterates the rows of one chunk
pub struct RowIter<'a> {
    data: &'a [u8],
    pos: usize,
    columns: usize,
    failed: bool,
}

impl<'a> RowIter<'a> {
    pub fn new(data: &'a [u8], columns: usize) -> Self {
        Self {
            data,
            pos: 0,
            columns,
            failed: false,
        }
    }
}

impl Iterator for RowIter<'_> {
    type Item = Result<Vec<SqlValue>, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        if self.columns == 0 {
            self.failed = true;
            return Some(Err(BridgeError::EncodingError(
                "row data for a result set without columns".to_string(),
            )));
        }
        let row = decode_row(self.data, &mut self.pos, self.columns);
        if row.is_err() {
            self.failed = true;
        }
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_range() {
        assert_eq!(ItemType::try_from(0).unwrap(), ItemType::Null);
        assert_eq!(ItemType::try_from(16).unwrap(), ItemType::Unknown);
        assert!(ItemType::try_from(17).is_err());
    }

    #[test]
    fn test_decode_fixed_width() {
        let mut data = vec![ItemType::Integer as u8];
        data.extend_from_slice(&(-5i32).to_le_bytes());
        data.push(ItemType::Boolean as u8);
        data.push(1);
        data.push(ItemType::Null as u8);

        let rows: Vec<_> = RowIter::new(&data, 3).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &vec![SqlValue::Int(-5), SqlValue::Boolean(true), SqlValue::Null]
        );
    }

    #[test]
    fn test_decode_truncated() {
        let data = [ItemType::Long as u8, 1, 2, 3];
        let mut pos = 0;
        assert!(matches!(
            decode_value(&data, &mut pos),
            Err(BridgeError::EncodingError(_))
        ));
    }

    #[test]
    fn test_decode_time_and_date() {
        let mut data = vec![ItemType::Time as u8];
        data.extend_from_slice(&(3_723_004i64).to_le_bytes());
        data.push(ItemType::Date as u8);
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        data.extend_from_slice(&date_to_millis(&date).to_le_bytes());

        let mut pos = 0;
        assert_eq!(
            decode_value(&data, &mut pos).unwrap(),
            SqlValue::Time(NaiveTime::from_hms_milli_opt(1, 2, 3, 4).unwrap())
        );
        assert_eq!(decode_value(&data, &mut pos).unwrap(), SqlValue::Date(date));
        assert_eq!(pos, data.len());
    }

    #[test]
    fn test_decode_decimal() {
        let mut data = vec![ItemType::BigDecimal as u8];
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&[0x30, 0x39]); // 12345
        let mut pos = 0;
        match decode_value(&data, &mut pos).unwrap() {
            SqlValue::BigDecimal(d) => assert_eq!(d.to_string(), "123.45"),
            other => panic!("Unexpected value: {:?}", other),
        }
    }
}
