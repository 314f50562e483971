//! Value Codec Tests
//!
//! Encodes gateway values into the row format and decodes them with the
//! client decoder:
//! - Fixed width numbers and booleans
//! - Text, binary and streamed values
//! - Arbitrary precision integers and decimals
//! - Temporal values

use chrono::{NaiveDate, NaiveTime};
use sqlbridge::backend::NativeValue;
use sqlbridge::stream::{encode_row, encode_value};
use sqlbridge::GatewayError;
use sqlbridge_client::protocol::{decode_value, BigDecimal, BigInteger, RowIter, SqlValue};
use std::io::Cursor;

fn round_trip(value: NativeValue) -> SqlValue {
    let mut buf = Vec::new();
    encode_value(&mut buf, value).expect("encode failed");
    let mut pos = 0;
    let decoded = decode_value(&buf, &mut pos).expect("decode failed");
    assert_eq!(pos, buf.len(), "decoder must consume the whole value");
    decoded
}

// ============================================================================
// Fixed Width Values
// ============================================================================

#[test]
fn test_int32() {
    for v in [0, 1, -1, i32::MIN, i32::MAX] {
        assert_eq!(round_trip(NativeValue::I32(v)), SqlValue::Int(v));
    }
}

#[test]
fn test_int64() {
    for v in [0, -42, i64::MIN, i64::MAX] {
        assert_eq!(round_trip(NativeValue::I64(v)), SqlValue::Long(v));
    }
}

#[test]
fn test_float64() {
    for v in [0.0, -1.5, f64::MAX, f64::MIN_POSITIVE, std::f64::consts::PI] {
        assert_eq!(round_trip(NativeValue::F64(v)), SqlValue::Double(v));
    }
}

#[test]
fn test_boolean() {
    assert_eq!(round_trip(NativeValue::Bool(true)), SqlValue::Boolean(true));
    assert_eq!(round_trip(NativeValue::Bool(false)), SqlValue::Boolean(false));
}

#[test]
fn test_small_integers_and_char() {
    assert_eq!(round_trip(NativeValue::I8(-7)), SqlValue::Byte(-7));
    assert_eq!(round_trip(NativeValue::I16(300)), SqlValue::Short(300));
    assert_eq!(round_trip(NativeValue::Char('é')), SqlValue::Char('é'));
    // no single UTF-16 unit: falls back to text
    assert_eq!(
        round_trip(NativeValue::Char('😀')),
        SqlValue::Text("😀".to_string())
    );
}

#[test]
fn test_null() {
    let mut buf = Vec::new();
    encode_value(&mut buf, NativeValue::Null).unwrap();
    assert_eq!(buf, vec![0]);
    assert!(round_trip(NativeValue::Null).is_null());
}

// ============================================================================
// Variable Length Values
// ============================================================================

#[test]
fn test_multibyte_utf8_string() {
    let text = "naïve — 日本語 🚀";
    assert_eq!(
        round_trip(NativeValue::Text(text.to_string())),
        SqlValue::Text(text.to_string())
    );
}

#[test]
fn test_embedded_nul_survives() {
    let text = "a\0b";
    let decoded = round_trip(NativeValue::Text(text.to_string()));
    assert_eq!(decoded.as_str().unwrap().as_bytes(), b"a\0b");
}

#[test]
fn test_binary_blob() {
    let blob: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    assert_eq!(
        round_trip(NativeValue::Bytes(blob.clone())),
        SqlValue::Binary(blob.clone())
    );
    assert_eq!(
        round_trip(NativeValue::Blob(Box::new(Cursor::new(blob.clone())))),
        SqlValue::Binary(blob)
    );
}

#[test]
fn test_clob_stream() {
    let text = "streamed ✓".repeat(100);
    assert_eq!(
        round_trip(NativeValue::Clob(Box::new(Cursor::new(text.clone().into_bytes())))),
        SqlValue::Text(text)
    );
}

#[test]
fn test_invalid_utf8_clob_is_encoding_error() {
    let mut buf = vec![9, 9];
    let err = encode_row(
        &mut buf,
        vec![
            NativeValue::I32(1),
            NativeValue::Clob(Box::new(Cursor::new(vec![0xff, 0xfe]))),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, GatewayError::EncodingError(_)));
    // partial row is discarded
    assert_eq!(buf, vec![9, 9]);
}

#[test]
fn test_array_rendering() {
    let array = NativeValue::Array(vec![
        NativeValue::I32(1),
        NativeValue::Null,
        NativeValue::Bytes(vec![0xca, 0xfe]),
        NativeValue::Array(vec![NativeValue::Text("x".to_string())]),
    ]);
    assert_eq!(
        round_trip(array),
        SqlValue::Text("{1, NULL, 0xCAFE, {x}}".to_string())
    );
}

#[test]
fn test_unrecognized_value() {
    assert_eq!(
        round_trip(NativeValue::Other("POINT(1 2)".to_string())),
        SqlValue::Unknown("POINT(1 2)".to_string())
    );
}

// ============================================================================
// Arbitrary Precision
// ============================================================================

#[test]
fn test_256_byte_big_integer() {
    let mut bytes = vec![0x7f];
    bytes.extend((1..256).map(|i| (i * 37 % 251) as u8));
    assert_eq!(bytes.len(), 256);

    let value = BigInteger::from_signed_bytes_be(&bytes);
    assert_eq!(value.to_signed_bytes_be().len(), 256);
    assert_eq!(
        round_trip(NativeValue::BigInt(value.clone())),
        SqlValue::BigInteger(value)
    );
}

#[test]
fn test_negative_big_integer() {
    let value: BigInteger = "-123456789012345678901234567890".parse().unwrap();
    match round_trip(NativeValue::BigInt(value.clone())) {
        SqlValue::BigInteger(decoded) => {
            assert_eq!(decoded.to_string(), "-123456789012345678901234567890");
        }
        other => panic!("Unexpected value: {:?}", other),
    }
}

#[test]
fn test_decimal_with_scale() {
    let value: BigDecimal = "-1234.5678".parse().unwrap();
    assert_eq!(value.scale, 4);
    match round_trip(NativeValue::Decimal(value)) {
        SqlValue::BigDecimal(decoded) => {
            assert_eq!(decoded.scale, 4);
            assert_eq!(decoded.to_string(), "-1234.5678");
        }
        other => panic!("Unexpected value: {:?}", other),
    }
}

#[test]
fn test_decimal_with_zero_scale_is_integer() {
    let value: BigDecimal = "98765".parse().unwrap();
    assert_eq!(value.scale, 0);
    match round_trip(NativeValue::Decimal(value)) {
        SqlValue::BigInteger(decoded) => assert_eq!(decoded.to_string(), "98765"),
        other => panic!("Unexpected value: {:?}", other),
    }
}

#[test]
fn test_decimal_with_negative_scale_is_normalized() {
    let value = BigDecimal::new(BigInteger::from(12i64), -3);
    match round_trip(NativeValue::Decimal(value)) {
        SqlValue::BigInteger(decoded) => assert_eq!(decoded.to_string(), "12000"),
        other => panic!("Unexpected value: {:?}", other),
    }
}

// ============================================================================
// Temporal Values
// ============================================================================

#[test]
fn test_temporal_values() {
    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    assert_eq!(round_trip(NativeValue::Date(date)), SqlValue::Date(date));

    let time = NaiveTime::from_hms_milli_opt(23, 59, 58, 125).unwrap();
    assert_eq!(round_trip(NativeValue::Time(time)), SqlValue::Time(time));

    let stamp = date.and_hms_milli_opt(12, 30, 0, 500).unwrap();
    assert_eq!(
        round_trip(NativeValue::Timestamp(stamp)),
        SqlValue::DateTime(stamp)
    );
}

#[test]
fn test_row_iteration() {
    let mut buf = Vec::new();
    for i in 0..3 {
        encode_row(
            &mut buf,
            vec![NativeValue::I32(i), NativeValue::Text(format!("row {}", i))],
        )
        .unwrap();
    }
    let rows: Vec<_> = RowIter::new(&buf, 2).map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2][1], SqlValue::Text("row 2".to_string()));
}
