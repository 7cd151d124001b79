/// How a measurement compares with its acceptable range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Threshold {
    InRange,
    BelowLower,
    AboveUpper,
}

/// Classifies `value` against optional bounds; values equal to a bound are in range.
pub fn highlight(value: f64, lower: Option<f64>, upper: Option<f64>) -> Threshold {
    if lower.is_some_and(|lower| value < lower) {
        Threshold::BelowLower
    } else if upper.is_some_and(|upper| value > upper) {
        Threshold::AboveUpper
    } else {
        Threshold::InRange
    }
}

/// Human readable acceptable range, e.g. `"35 to 41"`, `"> 135"` or `"< 41"`.
pub fn spec_range_label(lower: Option<f64>, upper: Option<f64>) -> Option<String> {
    match (lower, upper) {
        (Some(lower), Some(upper)) => Some(format!("{lower} to {upper}")),
        (Some(lower), None) => Some(format!("> {lower}")),
        (None, Some(upper)) => Some(format!("< {upper}")),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_against_bounds() {
        assert_eq!(highlight(5.0, Some(10.0), None), Threshold::BelowLower);
        assert_eq!(highlight(5.0, None, None), Threshold::InRange);
        assert_eq!(highlight(45.0, Some(35.0), Some(41.0)), Threshold::AboveUpper);
        assert_eq!(highlight(41.0, Some(35.0), Some(41.0)), Threshold::InRange);
        assert_eq!(highlight(35.0, Some(35.0), None), Threshold::InRange);
    }

    #[test]
    fn labels_ranges() {
        assert_eq!(spec_range_label(Some(35.0), Some(41.0)).as_deref(), Some("35 to 41"));
        assert_eq!(spec_range_label(Some(135.0), None).as_deref(), Some("> 135"));
        assert_eq!(spec_range_label(None, None), None);
    }
}
