//! Fixed-point arithmetic over `U256`, scaled by 1e18.
//!
//! Mirrors the protocol contracts' integer semantics exactly: every division
//! truncates toward zero and no floating point is ever involved. Products of
//! two scaled values are divided by [`ONE`] afterwards; quotients of two
//! scaled values multiply the numerator by [`ONE`] first.

use alloy::primitives::U256;

use fxvault_common::error::ArithmeticError;

/// One unit (1.0) in 18-decimal fixed point.
pub const ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Floor of the liquidation ratio (1.1).
pub const MIN_LIQUIDATION_RATIO: U256 = U256::from_limbs([1_100_000_000_000_000_000, 0, 0, 0]);

const DECIMALS: usize = 18;

pub fn checked_add(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    a.checked_add(b).ok_or(ArithmeticError::Overflow)
}

pub fn checked_sub(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    a.checked_sub(b).ok_or(ArithmeticError::Underflow)
}

pub fn checked_mul(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    a.checked_mul(b).ok_or(ArithmeticError::Overflow)
}

pub fn checked_div(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    if b.is_zero() {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(a / b)
}

/// `a * b / c`, truncating.
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, ArithmeticError> {
    checked_div(checked_mul(a, b)?, c)
}

/// Product of two scaled values: `a * b / ONE`.
pub fn mul_down(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    mul_div(a, b, ONE)
}

/// Quotient of two scaled values: `a * ONE / b`.
pub fn div_down(a: U256, b: U256) -> Result<U256, ArithmeticError> {
    mul_div(a, ONE, b)
}

/// `a * percent / 100`, truncating.
pub fn scale_percent(a: U256, percent: u64) -> Result<U256, ArithmeticError> {
    mul_div(a, U256::from(percent), U256::from(100u64))
}

/// Parse a decimal literal such as `"1.1"` into fixed point.
///
/// Digits beyond the 18th decimal place are rejected rather than rounded.
pub fn parse_fixed(literal: &str) -> Result<U256, ArithmeticError> {
    let invalid = || ArithmeticError::InvalidLiteral(literal.to_string());
    let (whole, frac) = match literal.split_once('.') {
        Some((w, f)) => (w, f),
        None => (literal, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > DECIMALS
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| invalid())?
    };
    let frac = if frac.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{frac:0<DECIMALS$}");
        U256::from_str_radix(&padded, 10).map_err(|_| invalid())?
    };

    checked_add(checked_mul(whole, ONE)?, frac)
}

/// Render a fixed-point value with all 18 decimals, trailing zeros trimmed.
pub fn format_fixed(value: U256) -> String {
    let whole = value / ONE;
    let frac = value % ONE;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>DECIMALS$}", frac.to_string());
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(literal: &str) -> U256 {
        parse_fixed(literal).unwrap()
    }

    #[test]
    fn test_constants() {
        assert_eq!(ONE, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(MIN_LIQUIDATION_RATIO, fp("1.1"));
    }

    #[test]
    fn test_mul_down_truncates() {
        assert_eq!(mul_down(fp("1.5"), fp("2")).unwrap(), fp("3"));
        // 1 wei * 0.5 = 0.5 wei, truncated to zero
        assert_eq!(mul_down(U256::from(1), fp("0.5")).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_div_down_truncates() {
        assert_eq!(div_down(fp("3"), fp("2")).unwrap(), fp("1.5"));
        // 1 / 3 = 0.333...333 (never rounded up)
        assert_eq!(
            div_down(ONE, fp("3")).unwrap(),
            U256::from(333_333_333_333_333_333u64)
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert_eq!(div_down(ONE, U256::ZERO), Err(ArithmeticError::DivisionByZero));
        assert_eq!(mul_div(ONE, ONE, U256::ZERO), Err(ArithmeticError::DivisionByZero));
    }

    #[test]
    fn test_overflow_and_underflow() {
        assert_eq!(checked_mul(U256::MAX, U256::from(2)), Err(ArithmeticError::Overflow));
        assert_eq!(checked_add(U256::MAX, U256::from(1)), Err(ArithmeticError::Overflow));
        assert_eq!(checked_sub(U256::ZERO, U256::from(1)), Err(ArithmeticError::Underflow));
        assert_eq!(mul_down(U256::MAX, fp("2")), Err(ArithmeticError::Overflow));
    }

    #[test]
    fn test_scale_percent() {
        assert_eq!(scale_percent(fp("1.5"), 80).unwrap(), fp("1.2"));
        assert_eq!(scale_percent(U256::from(7), 80).unwrap(), U256::from(5));
    }

    #[test]
    fn test_parse_fixed() {
        assert_eq!(fp("1"), ONE);
        assert_eq!(fp("0.000000000000000001"), U256::from(1));
        assert_eq!(fp(".5"), ONE / U256::from(2));
        assert_eq!(fp("105"), U256::from(105) * ONE);
        assert!(parse_fixed("").is_err());
        assert!(parse_fixed("1.0000000000000000001").is_err());
        assert!(parse_fixed("-1").is_err());
        assert!(parse_fixed("1e18").is_err());
    }

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(fp("1.05")), "1.05");
        assert_eq!(format_fixed(fp("100")), "100");
        assert_eq!(format_fixed(U256::from(1)), "0.000000000000000001");
    }
}
