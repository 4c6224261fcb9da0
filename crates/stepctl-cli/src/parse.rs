//! Argument token parsing.
//!
//! Numeric tokens are parsed leniently, the way C's `strtol(s, NULL, 0)`
//! does: leading whitespace and a sign are accepted, the base is detected
//! from a `0x` / `0` prefix, and parsing stops at the first invalid
//! character.  A token without any digits parses as zero.  Values outside
//! the target type saturate.
//!
//! Enumerant tokens (`on`/`off`, direction, resolution) are strict and fail
//! with [`StepperError::InvalidArgument`].

use stepctl_types::{Direction, MicroStepResolution, StepperError};

/// Lenient integer parse with automatic base detection.
pub fn lenient_long(token: &str) -> i64 {
    let s = token.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let hex = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .filter(|digits| digits.starts_with(|c: char| c.is_ascii_hexdigit()));
    let (radix, digits) = match hex {
        Some(digits) => (16, digits),
        None if rest.starts_with('0') => (8, rest),
        None => (10, rest),
    };

    let mut magnitude: i128 = 0;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        magnitude = (magnitude * i128::from(radix) + i128::from(digit)).min(i128::from(u64::MAX));
    }
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Lenient signed 32-bit parse (positions, step counts).
pub fn lenient_i32(token: &str) -> i32 {
    lenient_long(token).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Lenient unsigned 32-bit parse (velocities).  Negative input saturates to
/// zero.
pub fn lenient_u32(token: &str) -> u32 {
    lenient_long(token).clamp(0, i64::from(u32::MAX)) as u32
}

/// `on` / `off`, nothing else.
pub fn on_off(token: &str) -> Result<bool, StepperError> {
    match token {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(StepperError::InvalidArgument {
            what: "enable".to_string(),
            value: other.to_string(),
        }),
    }
}

/// Direction by name (`positive` / `negative`) or by number (`0` / `1`).
pub fn direction(token: &str) -> Result<Direction, StepperError> {
    match Direction::from_name(token) {
        Some(direction) => Ok(direction),
        None => Direction::try_from(lenient_long(token)).map_err(|_| {
            StepperError::InvalidArgument {
                what: "direction".to_string(),
                value: token.to_string(),
            }
        }),
    }
}

/// Micro-step resolution given as its divisor (`1`, `2`, … `256`).
pub fn resolution(token: &str) -> Result<MicroStepResolution, StepperError> {
    MicroStepResolution::try_from(lenient_u32(token)).map_err(|_| StepperError::InvalidArgument {
        what: "micro-step resolution".to_string(),
        value: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_values_parse_exactly() {
        assert_eq!(lenient_i32("500"), 500);
        assert_eq!(lenient_i32("-200"), -200);
        assert_eq!(lenient_i32("+7"), 7);
        assert_eq!(lenient_u32("3000"), 3000);
    }

    #[test]
    fn base_prefixes_are_detected() {
        assert_eq!(lenient_long("0x1F"), 31);
        assert_eq!(lenient_long("0XfF"), 255);
        assert_eq!(lenient_long("010"), 8);
        assert_eq!(lenient_long("-0x10"), -16);
        // "0x" without hex digits is the number zero followed by junk.
        assert_eq!(lenient_long("0xg"), 0);
    }

    #[test]
    fn unparseable_tokens_default_to_zero() {
        assert_eq!(lenient_i32("abc"), 0);
        assert_eq!(lenient_i32(""), 0);
        assert_eq!(lenient_i32("-"), 0);
        assert_eq!(lenient_u32("fast"), 0);
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        assert_eq!(lenient_i32("  42steps"), 42);
        assert_eq!(lenient_i32("12.5"), 12);
        // Octal stops at the first non-octal digit.
        assert_eq!(lenient_long("019"), 1);
    }

    #[test]
    fn out_of_range_values_saturate() {
        assert_eq!(lenient_i32("99999999999"), i32::MAX);
        assert_eq!(lenient_i32("-99999999999"), i32::MIN);
        assert_eq!(lenient_u32("-1"), 0);
        assert_eq!(lenient_u32("0x1FFFFFFFF"), u32::MAX);
        assert_eq!(lenient_long("999999999999999999999999"), i64::MAX);
    }

    #[test]
    fn on_off_is_strict() {
        assert_eq!(on_off("on"), Ok(true));
        assert_eq!(on_off("off"), Ok(false));
        let err = on_off("ON").unwrap_err();
        assert_eq!(err.to_string(), "Invalid enable value: ON");
    }

    #[test]
    fn direction_accepts_names_and_numbers() {
        assert_eq!(direction("positive"), Ok(Direction::Positive));
        assert_eq!(direction("1"), Ok(Direction::Positive));
        assert_eq!(direction("0"), Ok(Direction::Negative));
        assert!(direction("2").is_err());
    }

    #[test]
    fn resolution_requires_power_of_two_divisor() {
        assert_eq!(resolution("16"), Ok(MicroStepResolution::Sixteenth));
        assert_eq!(resolution("0x100"), Ok(MicroStepResolution::TwoFiftySixth));
        let err = resolution("3").unwrap_err();
        assert!(matches!(err, StepperError::InvalidArgument { .. }));
        assert!(resolution("garbage").is_err());
    }
}
