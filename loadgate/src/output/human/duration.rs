use std::time::Duration;

/// One rounded component: `850us`, `12ms` or `3s`. Ties round up.
pub(crate) fn format_duration_single(d: Duration) -> String {
    let nanos = d.as_nanos();
    let (unit_ns, suffix) = match nanos {
        n if n >= 1_000_000_000 => (1_000_000_000, "s"),
        n if n >= 1_000_000 => (1_000_000, "ms"),
        _ => (1_000, "us"),
    };
    format!("{}{suffix}", (nanos + unit_ns / 2) / unit_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_largest_unit() {
        assert_eq!(format_duration_single(Duration::from_micros(850)), "850us");
        assert_eq!(format_duration_single(Duration::from_micros(12_400)), "12ms");
        assert_eq!(format_duration_single(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration_single(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration_single(Duration::ZERO), "0us");
    }
}
