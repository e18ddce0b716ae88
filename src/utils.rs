use once_cell::sync::Lazy;
use regex::Regex;
use transit_planner::config::{MAX_TRANSFERS, MIN_TRANSFERS};
use transit_planner::protocol::{Arrival, Time};

// Compiled regexes for time-of-day parsing
static TIME_COLON_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?$").unwrap());
static TIME_HOURS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})h(\d{2})?$").unwrap());

/// Time parsing error types for better error handling
#[derive(Debug, PartialEq)]
pub enum TimeParseError {
    EmptyInput,
    InvalidFormat(String),
    InvalidHours(u32),
    InvalidMinutes(u32),
    InvalidSeconds(u32),
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeParseError::EmptyInput => write!(f, "Time cannot be empty"),
            TimeParseError::InvalidFormat(hint) => write!(f, "Invalid time format. {}", hint),
            TimeParseError::InvalidHours(h) => write!(f, "Invalid hours: {} (must be 0-23)", h),
            TimeParseError::InvalidMinutes(m) => write!(f, "Invalid minutes: {} (must be 0-59)", m),
            TimeParseError::InvalidSeconds(s) => write!(f, "Invalid seconds: {} (must be 0-59)", s),
        }
    }
}

impl std::error::Error for TimeParseError {}

fn checked_time(hours: u32, minutes: u32, seconds: u32) -> Result<Time, TimeParseError> {
    if hours > 23 {
        return Err(TimeParseError::InvalidHours(hours));
    }
    if minutes > 59 {
        return Err(TimeParseError::InvalidMinutes(minutes));
    }
    if seconds > 59 {
        return Err(TimeParseError::InvalidSeconds(seconds));
    }
    Ok(Time::from_hms(hours, minutes, seconds))
}

/// Parse a departure time of day.
///
/// Supported formats:
/// - Colon format: "8:30", "08:30" or "08:30:15"
/// - Hours format: "8h30" or "8h"
pub fn parse_time_of_day(input: &str) -> Result<Time, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::EmptyInput.to_string());
    }

    // Digits are guaranteed by the regexes; only the ranges need checking.
    let number = |m: Option<regex::Match>| m.map_or(0, |m| m.as_str().parse().unwrap_or(0));

    if let Some(captures) = TIME_COLON_REGEX.captures(trimmed) {
        return checked_time(
            number(captures.get(1)),
            number(captures.get(2)),
            number(captures.get(3)),
        )
        .map_err(|e| e.to_string());
    }

    if let Some(captures) = TIME_HOURS_REGEX.captures(trimmed) {
        return checked_time(number(captures.get(1)), number(captures.get(2)), 0)
            .map_err(|e| e.to_string());
    }

    Err(TimeParseError::InvalidFormat("Use: 8:30, 08:30:15 or 8h30".to_string()).to_string())
}

/// Generic numeric input validation
pub fn validate_numeric_input<T>(
    input: &str,
    min: Option<T>,
    max: Option<T>,
    field_name: &str,
) -> Result<T, String>
where
    T: std::str::FromStr + std::fmt::Display + PartialOrd,
{
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(format!("{} cannot be empty", field_name));
    }

    let val = trimmed
        .parse::<T>()
        .map_err(|_| format!("{} must be a valid number", field_name))?;
    if let Some(min_val) = min {
        if val < min_val {
            return Err(format!("{} must be at least {}", field_name, min_val));
        }
    }
    if let Some(max_val) = max {
        if val > max_val {
            return Err(format!("{} cannot exceed {}", field_name, max_val));
        }
    }
    Ok(val)
}

/// Validate the maximum number of transfers
pub fn validate_max_transfers(input: &str) -> Result<u8, String> {
    validate_numeric_input(input, Some(MIN_TRANSFERS), Some(MAX_TRANSFERS), "Transfers")
}

/// Whether a reply for `requested` still matches what the field holds now.
/// `requested` is the trimmed text the search was sent with.
pub fn is_current_query(latest: &str, requested: &str) -> bool {
    latest.trim() == requested
}

/// Human readable duration: `1h5min` in short form, `1 hours 5 minutes` otherwise.
pub fn humanize_duration(duration_secs: u32, short: bool) -> String {
    let hours = duration_secs / 3600;
    let minutes = (duration_secs % 3600) / 60;
    let seconds = duration_secs % 60;

    let units: [(u32, &str, &str); 3] = [
        (hours, "h", " hours"),
        (minutes, "min", " minutes"),
        (seconds, "s", " seconds"),
    ];
    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _, _)| *value > 0)
        .map(|(value, short_unit, long_unit)| {
            format!("{}{}", value, if short { short_unit } else { long_unit })
        })
        .collect();

    match (parts.is_empty(), short) {
        (true, true) => "0min".to_string(),
        (true, false) => "0 minutes".to_string(),
        (false, true) => parts.concat(),
        (false, false) => parts.join(" "),
    }
}

/// Count arrivals per band of `band_secs`, as `(band start, count)` pairs in
/// ascending order. Empty bands are kept so the table has no gaps.
pub fn isochrone_bands(arrivals: &[Arrival], band_secs: u32) -> Vec<(u32, usize)> {
    let band_secs = band_secs.max(1);
    let Some(last) = arrivals.iter().map(|a| a.duration / band_secs).max() else {
        return Vec::new();
    };
    let mut counts = vec![0usize; last as usize + 1];
    for arrival in arrivals {
        counts[(arrival.duration / band_secs) as usize] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(band, count)| (band as u32 * band_secs, count))
        .collect()
}
