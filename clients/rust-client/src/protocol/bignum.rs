//! Arbitrary-precision integers and decimals as they travel on the wire.
//!
//! Integers are `num_bigint::BigInt`; on the wire they are minimal
//! two's-complement big-endian bytes (`to_signed_bytes_be`).

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, Sign};

use super::error::BridgeError;

/// Arbitrary-precision signed integer
pub type BigInteger = BigInt;

/// Largest power of ten applied when a negative scale is folded into the
/// integer
pub const MAX_SCALE_UP: u32 = 1 << 16;

/// Arbitrary-precision decimal: `unscaled * 10^-scale`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal {
    pub unscaled: BigInteger,
    pub scale: i32,
}

impl BigDecimal {
    pub fn new(unscaled: BigInteger, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    /// The value as an integer, for scales of zero or below.
    ///
    /// `None` when the scale is positive or when `-scale` exceeds
    /// [`MAX_SCALE_UP`].
    pub fn to_integer(&self) -> Option<BigInteger> {
        if self.scale > 0 {
            return None;
        }
        let exp = self.scale.unsigned_abs();
        if exp > MAX_SCALE_UP {
            return None;
        }
        Some(&self.unscaled * BigInt::from(10u8).pow(exp))
    }
}

fn invalid_decimal(s: &str) -> BridgeError {
    BridgeError::ProtocolError(format!("invalid decimal literal '{}'", s))
}

impl FromStr for BigDecimal {
    type Err = BridgeError;

    /// Parses plain decimal notation (`-12.3400`); the scale is the number of
    /// fraction digits as written.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sign, unsigned) = match s.as_bytes().first() {
            Some(b'-') => ("-", &s[1..]),
            Some(b'+') => ("", &s[1..]),
            _ => ("", s),
        };
        let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !digits_only(int_part)
            || !digits_only(frac_part)
        {
            return Err(invalid_decimal(s));
        }
        let scale = i32::try_from(frac_part.len()).map_err(|_| invalid_decimal(s))?;
        let unscaled = format!("{}0{}{}", sign, int_part, frac_part)
            .parse::<BigInt>()
            .map_err(|_| invalid_decimal(s))?;
        Ok(Self { unscaled, scale })
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale <= 0 {
            let exp = self.scale.unsigned_abs();
            if exp > MAX_SCALE_UP {
                return write!(f, "{}E+{}", self.unscaled, exp);
            }
            write!(f, "{}", self.unscaled)?;
            if self.unscaled.sign() != Sign::NoSign {
                f.write_str(&"0".repeat(exp as usize))?;
            }
            return Ok(());
        }
        let digits = self.unscaled.magnitude().to_string();
        let sign = if self.unscaled.sign() == Sign::Minus { "-" } else { "" };
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
        } else {
            digits
        };
        let split = padded.len() - scale;
        write!(f, "{}{}.{}", sign, &padded[..split], &padded[split..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_are_minimal() {
        assert_eq!(BigInteger::from(0i64).to_signed_bytes_be(), vec![0x00]);
        assert_eq!(BigInteger::from(127i64).to_signed_bytes_be(), vec![0x7f]);
        assert_eq!(BigInteger::from(128i64).to_signed_bytes_be(), vec![0x00, 0x80]);
        assert_eq!(BigInteger::from(-1i64).to_signed_bytes_be(), vec![0xff]);
        assert_eq!(BigInteger::from(-129i64).to_signed_bytes_be(), vec![0xff, 0x7f]);
        assert_eq!(
            BigInteger::from_signed_bytes_be(&[0xff, 0xff, 0x80]),
            BigInteger::from(-128i64)
        );
    }

    #[test]
    fn test_decimal_parse() {
        let d: BigDecimal = "-12.3400".parse().unwrap();
        assert_eq!(d.scale, 4);
        assert_eq!(d.unscaled.to_string(), "-123400");

        let d: BigDecimal = ".5".parse().unwrap();
        assert_eq!((d.unscaled.clone(), d.scale), (BigInteger::from(5i64), 1));

        for bad in ["", "-", ".", "1.2.3", "1e5", "12a", "1_000"] {
            assert!(bad.parse::<BigDecimal>().is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_decimal_display() {
        let d: BigDecimal = "-12.3400".parse().unwrap();
        assert_eq!(d.to_string(), "-12.3400");

        let small = BigDecimal::new(BigInteger::from(5i64), 3);
        assert_eq!(small.to_string(), "0.005");

        let negative = BigDecimal::new(BigInteger::from(-5i64), 3);
        assert_eq!(negative.to_string(), "-0.005");

        let negative_scale = BigDecimal::new(BigInteger::from(-7i64), -2);
        assert_eq!(negative_scale.to_string(), "-700");
    }

    #[test]
    fn test_to_integer() {
        let value = BigDecimal::new(BigInteger::from(-12i64), -3);
        assert_eq!(value.to_integer(), Some(BigInteger::from(-12_000i64)));
        assert_eq!(
            BigDecimal::new(BigInteger::from(9i64), 0).to_integer(),
            Some(BigInteger::from(9i64))
        );
        assert_eq!(BigDecimal::new(BigInteger::from(1i64), 2).to_integer(), None);
        // refused instead of computing 10^(2^31)
        assert_eq!(
            BigDecimal::new(BigInteger::from(1i64), i32::MIN).to_integer(),
            None
        );
    }
}
