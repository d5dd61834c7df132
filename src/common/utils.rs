use std::time::Duration;

/// Format a duration as `1h 02m 03s`, `2m 05s` or `4.21s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

/// `part / whole` as a percentage, 0.0 when `whole` is zero
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    100.0 * part as f64 / whole as f64
}

/// Resident set size of the current process in MB, when the platform reports it
pub fn current_rss_mb() -> Option<f64> {
    memory_stats::memory_stats().map(|stats| stats.physical_mem as f64 / (1024.0 * 1024.0))
}

/// Render an optional memory reading for progress lines
pub fn format_memory(mb: Option<f64>) -> String {
    match mb {
        Some(mb) => format!("{:.1} MB", mb),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(4210)), "4.21s");
    }

    #[test]
    fn test_format_elapsed_minutes_and_hours() {
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 02m 03s");
    }

    #[test]
    fn test_percent_handles_zero_total() {
        assert_eq!(percent(3, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(Some(12.345)), "12.3 MB");
        assert_eq!(format_memory(None), "n/a");
    }

    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    #[test]
    fn test_current_rss_is_reported() {
        let rss = current_rss_mb().unwrap();
        assert!(rss > 0.0);
    }
}
