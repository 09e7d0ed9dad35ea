// Division-safe ratio arithmetic.
//
// Growth against a zero (or missing) base is reported as 0%, never as an
// infinity or `NaN`. Every derived percentage in the reports goes through
// these functions.

/// `numerator / denominator`, or `0.0` when the denominator is zero or not
/// finite, or when the result would not be finite.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return 0.0;
    }
    let r = numerator / denominator;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Relative change as a fraction: `1.0` means +100%.
pub fn growth_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 || !previous.is_finite() {
        return 0.0;
    }
    ratio(current, previous) - 1.0
}

/// Share of `total` in percentage points: `25.0` means 25%.
pub fn contribution_pct(value: f64, total: f64) -> f64 {
    ratio(value, total) * 100.0
}

/// Variance against budget as a fraction; a zero budget yields 0.
pub fn variance_pct(actual: f64, budget: f64) -> f64 {
    growth_pct(actual, budget)
}
