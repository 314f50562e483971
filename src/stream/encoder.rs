//! Tagged binary row encoding
//!
//! Each value is a tag byte followed by its payload, little-endian.
//! Variable-length payloads reserve a 4-byte length that is patched once the
//! payload has been written, so streams are copied straight into the frame.

use std::io::Read;

use sqlbridge_client::protocol::{
    date_to_millis, datetime_to_millis, time_to_millis, BigDecimal, ItemType,
};

use crate::backend::{NativeRow, NativeValue};
use crate::error::{GatewayError, GatewayResult};

/// Append every value of `row`. On failure the buffer is restored to its
/// previous length.
pub fn encode_row(buf: &mut Vec<u8>, row: NativeRow) -> GatewayResult<()> {
    let mark = buf.len();
    for value in row {
        if let Err(e) = encode_value(buf, value) {
            buf.truncate(mark);
            return Err(e);
        }
    }
    Ok(())
}

pub fn encode_value(buf: &mut Vec<u8>, value: NativeValue) -> GatewayResult<()> {
    match value {
        NativeValue::Null => buf.push(ItemType::Null as u8),
        NativeValue::Bool(v) => {
            buf.push(ItemType::Boolean as u8);
            buf.push(v as u8);
        }
        NativeValue::I8(v) => {
            buf.push(ItemType::Byte as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        NativeValue::I16(v) => {
            buf.push(ItemType::Short as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        NativeValue::I32(v) => {
            buf.push(ItemType::Integer as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        NativeValue::I64(v) => write_long(buf, ItemType::Long, v),
        NativeValue::F32(v) => {
            buf.push(ItemType::Float as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        NativeValue::F64(v) => {
            buf.push(ItemType::Double as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        NativeValue::Char(c) => match u16::try_from(c as u32) {
            Ok(unit) => {
                buf.push(ItemType::Char as u8);
                buf.extend_from_slice(&unit.to_le_bytes());
            }
            // outside the BMP: no single UTF-16 unit
            Err(_) => write_bytes(buf, ItemType::Text, c.to_string().as_bytes())?,
        },
        NativeValue::BigInt(v) => {
            write_bytes(buf, ItemType::BigInteger, &v.to_signed_bytes_be())?
        }
        NativeValue::Decimal(v) => write_decimal(buf, &v)?,
        NativeValue::Date(v) => write_long(buf, ItemType::Date, date_to_millis(&v)),
        NativeValue::Time(v) => write_long(buf, ItemType::Time, time_to_millis(&v)),
        NativeValue::Timestamp(v) => write_long(buf, ItemType::DateTime, datetime_to_millis(&v)),
        NativeValue::Text(v) => write_bytes(buf, ItemType::Text, v.as_bytes())?,
        NativeValue::Clob(reader) => write_stream(buf, ItemType::Text, reader, true)?,
        NativeValue::Blob(reader) => write_stream(buf, ItemType::Binary, reader, false)?,
        NativeValue::Bytes(v) => write_bytes(buf, ItemType::Binary, &v)?,
        NativeValue::Array(items) => {
            let text = render_array(items)?;
            write_bytes(buf, ItemType::Text, text.as_bytes())?
        }
        NativeValue::Other(v) => write_bytes(buf, ItemType::Unknown, v.as_bytes())?,
    }
    Ok(())
}

fn write_long(buf: &mut Vec<u8>, tag: ItemType, v: i64) {
    buf.push(tag as u8);
    buf.extend_from_slice(&v.to_le_bytes());
}

fn length_prefix(len: usize) -> GatewayResult<[u8; 4]> {
    i32::try_from(len)
        .map(i32::to_le_bytes)
        .map_err(|_| GatewayError::EncodingError(format!("value of {} bytes is too large", len)))
}

fn write_bytes(buf: &mut Vec<u8>, tag: ItemType, bytes: &[u8]) -> GatewayResult<()> {
    let prefix = length_prefix(bytes.len())?;
    buf.push(tag as u8);
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Scale 0 and negative scales travel as plain integers
fn write_decimal(buf: &mut Vec<u8>, v: &BigDecimal) -> GatewayResult<()> {
    if v.scale <= 0 {
        let integral = v.to_integer().ok_or_else(|| {
            GatewayError::EncodingError(format!("decimal scale {} is out of range", v.scale))
        })?;
        return write_bytes(buf, ItemType::BigInteger, &integral.to_signed_bytes_be());
    }
    let bytes = v.unscaled.to_signed_bytes_be();
    let prefix = length_prefix(bytes.len())?;
    buf.push(ItemType::BigDecimal as u8);
    buf.extend_from_slice(&v.scale.to_le_bytes());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(&bytes);
    Ok(())
}

fn write_stream(
    buf: &mut Vec<u8>,
    tag: ItemType,
    mut reader: Box<dyn Read + Send>,
    utf8: bool,
) -> GatewayResult<()> {
    let mark = buf.len();
    buf.push(tag as u8);
    let len_at = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    let start = buf.len();

    let result = reader
        .read_to_end(buf)
        .map_err(|e| GatewayError::EncodingError(format!("stream read failed: {}", e)))
        .and_then(|_| {
            if utf8 {
                std::str::from_utf8(&buf[start..]).map_err(|e| {
                    GatewayError::EncodingError(format!("character stream is not UTF-8: {}", e))
                })?;
            }
            length_prefix(buf.len() - start)
        });

    match result {
        Ok(prefix) => {
            buf[len_at..start].copy_from_slice(&prefix);
            Ok(())
        }
        Err(e) => {
            buf.truncate(mark);
            Err(e)
        }
    }
}

/// `{a, b, 0xCAFE, {nested}, NULL}`
fn render_array(items: Vec<NativeValue>) -> GatewayResult<String> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(render_element(item)?);
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

fn render_element(value: NativeValue) -> GatewayResult<String> {
    Ok(match value {
        NativeValue::Null => "NULL".to_string(),
        NativeValue::Bool(v) => v.to_string(),
        NativeValue::I8(v) => v.to_string(),
        NativeValue::I16(v) => v.to_string(),
        NativeValue::I32(v) => v.to_string(),
        NativeValue::I64(v) => v.to_string(),
        NativeValue::F32(v) => v.to_string(),
        NativeValue::F64(v) => v.to_string(),
        NativeValue::Char(v) => v.to_string(),
        NativeValue::BigInt(v) => v.to_string(),
        NativeValue::Decimal(v) => v.to_string(),
        NativeValue::Date(v) => v.to_string(),
        NativeValue::Time(v) => v.to_string(),
        NativeValue::Timestamp(v) => v.to_string(),
        NativeValue::Text(v) | NativeValue::Other(v) => v,
        NativeValue::Clob(mut reader) => {
            let mut text = String::new();
            reader.read_to_string(&mut text).map_err(|e| {
                GatewayError::EncodingError(format!("character stream read failed: {}", e))
            })?;
            text
        }
        NativeValue::Blob(mut reader) => {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| GatewayError::EncodingError(format!("stream read failed: {}", e)))?;
            format!("0x{}", hex::encode_upper(bytes))
        }
        NativeValue::Bytes(v) => format!("0x{}", hex::encode_upper(v)),
        NativeValue::Array(items) => render_array(items)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    use chrono::NaiveDate;
    use sqlbridge_client::protocol::{decode_value, BigInteger, SqlValue};

    fn encode(value: NativeValue) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_value(&mut buf, value).unwrap();
        buf
    }

    fn decode(buf: &[u8]) -> SqlValue {
        let mut pos = 0;
        let value = decode_value(buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        value
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "lob locator expired"))
        }
    }

    #[test]
    fn test_fixed_layouts() {
        assert_eq!(encode(NativeValue::Null), vec![0]);
        assert_eq!(encode(NativeValue::I32(1)), vec![4, 1, 0, 0, 0]);
        assert_eq!(encode(NativeValue::Bool(true)), vec![9, 1]);
        assert_eq!(encode(NativeValue::Char('A')), vec![8, 0x41, 0x00]);
        assert_eq!(encode(NativeValue::I8(-1)), vec![2, 0xff]);
    }

    #[test]
    fn test_text_length_prefix() {
        let buf = encode(NativeValue::Text("héllo".to_string()));
        assert_eq!(buf[0], ItemType::Text as u8);
        assert_eq!(i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]), 6);
        assert_eq!(decode(&buf), SqlValue::Text("héllo".to_string()));
    }

    #[test]
    fn test_char_outside_bmp_degrades_to_text() {
        let buf = encode(NativeValue::Char('😀'));
        assert_eq!(decode(&buf), SqlValue::Text("😀".to_string()));
    }

    #[test]
    fn test_decimal_scale_handling() {
        let zero_scale = BigDecimal::new(BigInteger::from(42i64), 0);
        assert_eq!(
            encode(NativeValue::Decimal(zero_scale))[0],
            ItemType::BigInteger as u8
        );

        let negative = BigDecimal::new(BigInteger::from(15i64), -3);
        match decode(&encode(NativeValue::Decimal(negative))) {
            SqlValue::BigInteger(v) => assert_eq!(v.to_string(), "15000"),
            other => panic!("Unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_huge_negative_scale_is_rejected() {
        let mut buf = vec![7];
        let err = encode_value(
            &mut buf,
            NativeValue::Decimal(BigDecimal::new(BigInteger::from(1i64), i32::MIN)),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::EncodingError(_)));
        assert_eq!(buf, vec![7]);
    }

    #[test]
    fn test_clob_stream() {
        let buf = encode(NativeValue::Clob(Box::new(Cursor::new(b"stream".to_vec()))));
        assert_eq!(decode(&buf), SqlValue::Text("stream".to_string()));
    }

    #[test]
    fn test_clob_invalid_utf8_is_encoding_error() {
        let mut buf = vec![7u8];
        let result = encode_value(
            &mut buf,
            NativeValue::Clob(Box::new(Cursor::new(vec![0x66, 0xff, 0xfe]))),
        );
        assert!(matches!(result, Err(GatewayError::EncodingError(_))));
        assert_eq!(buf, vec![7u8]);
    }

    #[test]
    fn test_failing_stream_restores_row() {
        let mut buf = Vec::new();
        let row = vec![NativeValue::I32(1), NativeValue::Blob(Box::new(FailingReader))];
        assert!(matches!(
            encode_row(&mut buf, row),
            Err(GatewayError::EncodingError(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_array_rendering() {
        let value = NativeValue::Array(vec![
            NativeValue::I32(1),
            NativeValue::Null,
            NativeValue::Bytes(vec![0xca, 0xfe]),
            NativeValue::Array(vec![NativeValue::Text("x".into())]),
        ]);
        assert_eq!(
            decode(&encode(value)),
            SqlValue::Text("{1, NULL, 0xCAFE, {x}}".to_string())
        );
    }

    #[test]
    fn test_temporal_values() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        let buf = encode(NativeValue::Date(date));
        assert_eq!(buf[0], ItemType::Date as u8);
        assert_eq!(
            i64::from_le_bytes(buf[1..9].try_into().unwrap()),
            86_400_000
        );
        assert_eq!(decode(&buf), SqlValue::Date(date));
    }

    #[test]
    fn test_other_uses_unknown_tag() {
        let buf = encode(NativeValue::Other("POINT(1 2)".to_string()));
        assert_eq!(buf[0], ItemType::Unknown as u8);
        assert_eq!(decode(&buf), SqlValue::Unknown("POINT(1 2)".to_string()));
    }
}
