/// `MM:SS`, or `HH:MM:SS` once an hour has passed.
pub fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::format_clock;

    #[test]
    fn formats_minutes_and_hours() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(125), "02:05");
        assert_eq!(format_clock(3600), "01:00:00");
        assert_eq!(format_clock(36_061), "10:01:01");
    }
}
