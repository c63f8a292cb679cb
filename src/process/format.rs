// src/process/format.rs

use crate::process::ProcessError;

/// Canonical fixed-precision rendering for observation values.
///
/// Integral values print with no decimal point. Fractional values print
/// fixed to 5 decimal places with trailing zeros (and a bare trailing dot)
/// trimmed, so the same number always yields the same text.
pub fn format_value(raw: &str) -> Result<String, ProcessError> {
    let n: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ProcessError::Formatting(raw.to_string()))?;
    if !n.is_finite() {
        return Err(ProcessError::Formatting(raw.to_string()));
    }

    if n.fract() == 0.0 {
        let s = format!("{:.0}", n);
        return Ok(if s == "-0" { "0".to_string() } else { s });
    }

    let mut s = format!("{:.5}", n);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    // values smaller than the precision collapse to zero
    if s == "-0" {
        s = "0".to_string();
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_values_have_no_decimal_point() {
        assert_eq!(format_value("12").unwrap(), "12");
        assert_eq!(format_value("12.0").unwrap(), "12");
        assert_eq!(format_value("-3").unwrap(), "-3");
        assert_eq!(format_value("1500000").unwrap(), "1500000");
    }

    #[test]
    fn fractional_values_trim_trailing_zeros() {
        assert_eq!(format_value("12.5").unwrap(), "12.5");
        assert_eq!(format_value("12.500").unwrap(), "12.5");
        assert_eq!(format_value("0.1234567").unwrap(), "0.12346");
        assert_eq!(format_value("3.10000").unwrap(), "3.1");
    }

    #[test]
    fn tiny_values_collapse_to_zero() {
        assert_eq!(format_value("0.000001").unwrap(), "0");
        assert_eq!(format_value("-0.000001").unwrap(), "0");
    }

    #[test]
    fn whitespace_is_tolerated() {
        assert_eq!(format_value(" 7.25 ").unwrap(), "7.25");
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(format_value("n.a.").is_err());
        assert!(format_value("").is_err());
        assert!(format_value("NaN").is_err());
    }
}
