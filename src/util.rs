// Parsing and display helpers shared by the pipeline stages.
//
// Extract fields arrive as loosely formatted text; everything past coercion
// works on `f64` and only the renderer turns numbers back into strings.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a string-like value into `f64`, forgiving the formatting noise
/// common in warehouse extracts.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed, including
///   `NaN` and infinities.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn average(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Descending comparison for sort keys; NaN compares equal.
pub fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

pub fn asc(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals first (`1234567.89`), then `num-format` inserts the
    // thousands separators into the integer part.
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    // `-0` after rounding is shown as `0`.
    let rounded_to_zero = s.chars().all(|c| c == '0' || c == '.');
    if n.is_sign_negative() && !rounded_to_zero {
        format!("-{}", res)
    } else {
        res
    }
}

/// `12.5` -> `"12.5%"`. The value is already in percentage points.
pub fn format_percent(points: f64, decimals: usize) -> String {
    format!("{}%", format_number(points, decimals))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Row counts in log lines, e.g. `9,855 rows`.
    n.to_formatted_string(&Locale::en)
}
