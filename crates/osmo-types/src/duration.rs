//! Duration string grammar: `xd`, `xh`, `xm`, `xs`, `xms`, `xus` (spec §6).

use std::time::Duration;

/// Parses a duration string like `"300s"`, `"5m"`, `"1h"`, `"1d"`, `"500ms"`, `"100us"`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let err = || format!("cannot recognize duration: {raw}. only support xd, xh, xm, xs, xms, xus");

    if raw.len() >= 3 {
        if let Some(prefix) = raw.strip_suffix("ms") {
            let value: u64 = prefix.parse().map_err(|_| err())?;
            return Ok(Duration::from_millis(value));
        }
        if let Some(prefix) = raw.strip_suffix("us") {
            let value: u64 = prefix.parse().map_err(|_| err())?;
            return Ok(Duration::from_micros(value));
        }
    }

    let (prefix, unit) = raw.split_at(raw.len().saturating_sub(1));
    let value: u64 = prefix.parse().map_err(|_| err())?;
    match unit {
        "d" => Ok(Duration::from_secs(value * 86_400)),
        "h" => Ok(Duration::from_secs(value * 3_600)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(err()),
    }
}

/// Renders a duration back to the canonical whole-second form (matches the
/// original's `timedelta_to_str`, which always emits seconds).
pub fn format_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

/// Human-readable rendering for display purposes (`"1d 2h 3m"`-style), coarsest unit first.
pub fn readable_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("300s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("100us").unwrap(), Duration::from_micros(100));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5y").is_err());
        assert!(parse_duration("nope").is_err());
    }

    #[test]
    fn readable_form_uses_coarsest_units() {
        assert_eq!(readable_duration(Duration::from_secs(90_061)), "1d 1h 1m 1s");
        assert_eq!(readable_duration(Duration::from_secs(0)), "0s");
    }
}
