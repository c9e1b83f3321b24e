pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_ms(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.2}ms"),
        _ => "n/a".to_string(),
    }
}

pub(crate) fn format_percent(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}%")
    } else {
        "n/a".to_string()
    }
}

/// A value in its threshold unit: `0.25s`, `99.50%`, `120rps`.
pub(crate) fn format_value(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) if v.is_finite() => {
            let sep = if unit.chars().next().is_some_and(char::is_alphabetic) && unit.len() > 3 {
                " "
            } else {
                ""
            };
            format!("{}{sep}{unit}", trim_float(v))
        }
        _ => "n/a".to_string(),
    }
}

fn trim_float(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_values_with_units() {
        assert_eq!(format_value(Some(250.0), "ms"), "250ms");
        assert_eq!(format_value(Some(99.5), "%"), "99.5%");
        assert_eq!(format_value(Some(0.123_4), "s"), "0.12s");
        assert_eq!(format_value(Some(0.0), "rps"), "0rps");
        assert_eq!(format_value(Some(12.0), "req/s"), "12 req/s");
        assert_eq!(format_value(None, "ms"), "n/a");
    }

    #[test]
    fn formats_latencies_and_rates() {
        assert_eq!(format_ms(Some(1.5)), "1.50ms");
        assert_eq!(format_ms(None), "n/a");
        assert_eq!(format_rate(f64::NAN), "0");
        assert_eq!(format_percent(12.346), "12.35%");
    }
}
