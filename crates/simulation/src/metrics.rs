//! Dashboard ratios.

/// Shown wherever a ratio has no meaningful value yet.
pub const RATIO_UNDEFINED: &str = "-";

/// `0.4` → `"40.0%"`, `None` → `"-"`.
pub fn format_ratio(ratio: Option<f64>) -> String {
    match ratio {
        Some(r) if r.is_finite() => format!("{:.1}%", r * 100.0),
        _ => RATIO_UNDEFINED.to_string(),
    }
}

/// `numerator / denominator`, or `None` when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}
