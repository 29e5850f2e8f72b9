//! Display strings for KPI tiles.
//!
//! Magnitude thresholds are applied to `|value|` and the sign stays right after
//! the currency symbol, so a loss of 1,234 reads `$-1.2K`.

use itertools::Itertools;

const MILLION: f64 = 1_000_000.0;
const THOUSAND: f64 = 1_000.0;

/// `$X.XXM`, `$X.XK` or `$X.XX` depending on magnitude.
pub fn format_currency(value: f64) -> String {
    format!("${}", scaled(value, 2))
}

/// Same thresholds as currency, without the symbol; whole units below 1,000.
pub fn format_quantity(value: f64) -> String {
    scaled(value, 0)
}

/// Ratio rendered as a percentage with two decimals: `0.1234` -> `12.34%`.
pub fn format_percent(ratio: f64) -> String {
    format!("{}%", fixed(finite(ratio) * 100.0, 2))
}

/// `$1,234.56`: full value with thousands separators.
pub fn format_currency_grouped(value: f64) -> String {
    let text = fixed(finite(value), 2);
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    let grouped = whole
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .join(",");
    format!("${}{}.{}", sign, grouped, fraction)
}

/// Picks the unit from the value as it would be displayed, so `999.999`
/// becomes `1.0K` rather than `1000.00`.
fn scaled(value: f64, small_decimals: usize) -> String {
    let value = finite(value);
    if rounded(value / THOUSAND, 1).abs() >= THOUSAND {
        format!("{}M", fixed(value / MILLION, 2))
    } else if rounded(value, small_decimals).abs() >= THOUSAND {
        format!("{}K", fixed(value / THOUSAND, 1))
    } else {
        fixed(value, small_decimals)
    }
}

fn rounded(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Fixed-point text without a negative zero.
fn fixed(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_thresholds() {
        assert_eq!(format_currency(999.0), "$999.00");
        assert_eq!(format_currency(1500.0), "$1.5K");
        assert_eq!(format_currency(2_500_000.0), "$2.50M");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(1000.0), "$1.0K");
        assert_eq!(format_currency(12.346), "$12.35");
    }

    #[test]
    fn test_unit_follows_rounded_value() {
        assert_eq!(format_currency(999.999), "$1.0K");
        assert_eq!(format_currency(999_999.99), "$1.00M");
        assert_eq!(format_currency(-999_999.99), "$-1.00M");
        assert_eq!(format_currency(999.994), "$999.99");
        assert_eq!(format_quantity(999.4), "999");
        assert_eq!(format_quantity(999.6), "1.0K");
    }

    #[test]
    fn test_currency_negative_keeps_sign() {
        assert_eq!(format_currency(-1234.0), "$-1.2K");
        assert_eq!(format_currency(-2_500_000.0), "$-2.50M");
        assert_eq!(format_currency(-12.5), "$-12.50");
        assert_eq!(format_currency(-0.0), "$0.00");
        assert_eq!(format_currency(-0.001), "$0.00");
    }

    #[test]
    fn test_non_finite_renders_as_zero() {
        assert_eq!(format_currency(f64::NAN), "$0.00");
        assert_eq!(format_percent(f64::INFINITY), "0.00%");
    }

    #[test]
    fn test_percent() {
        assert_eq!(format_percent(0.1234), "12.34%");
        assert_eq!(format_percent(0.0), "0.00%");
        assert_eq!(format_percent(-0.05), "-5.00%");
    }

    #[test]
    fn test_quantity() {
        assert_eq!(format_quantity(999.0), "999");
        assert_eq!(format_quantity(1500.0), "1.5K");
        assert_eq!(format_quantity(2_500_000.0), "2.50M");
        assert_eq!(format_quantity(0.0), "0");
    }

    #[test]
    fn test_grouped_currency() {
        assert_eq!(format_currency_grouped(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency_grouped(12.5), "$12.50");
        assert_eq!(format_currency_grouped(-1234.5), "$-1,234.50");
        assert_eq!(format_currency_grouped(999.999), "$1,000.00");
    }
}
