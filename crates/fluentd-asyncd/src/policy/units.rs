//! Value parsers for the free-form delivery options.
//!
//! The option grammar is the one Docker users already write for the stock
//! fluentd driver: sizes such as `8m` or `1.5GiB`, durations such as `500ms`
//! or `1m30s` and Go-style booleans.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*) ?([kKmMgGtTpP])?[iI]?[bB]?$"));

const NANOS_PER_MILLI: u128 = 1_000_000;

/// Parses a human-readable size with binary multiples (`k` = 1024).
pub(crate) fn parse_size(value: &str) -> Result<u64, String> {
    let pattern = SIZE_PATTERN
        .as_ref()
        .map_err(|error| format!("size pattern failed to compile: {error}"))?;
    let captures = pattern
        .captures(value)
        .ok_or_else(|| format!("invalid size: '{value}'"))?;
    let number = captures.get(1).map_or("", |m| m.as_str());
    let multiplier: u128 = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1,
        Some(unit) => match unit.as_str() {
            "k" => 1 << 10,
            "m" => 1 << 20,
            "g" => 1 << 30,
            "t" => 1 << 40,
            _ => 1 << 50,
        },
    };

    let scaled = scale_decimal(number, multiplier)
        .ok_or_else(|| format!("invalid size: '{value}'"))?;
    u64::try_from(scaled).map_err(|_| format!("size out of range: '{value}'"))
}

/// Parses a duration such as `300ms`, `1.5s` or `1h2m`.
///
/// Negative durations are rejected: a retry wait must not go backwards.
pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    let (negative, mut rest) = match value.as_bytes().first() {
        Some(b'-') => (true, value.get(1..).unwrap_or_default()),
        Some(b'+') => (false, value.get(1..).unwrap_or_default()),
        _ => (false, value),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(format!("invalid duration '{value}'"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, after_number) = rest.split_at(number_len);
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(format!("invalid duration '{value}'"));
        }
        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);
        let nanos_per_unit: u128 = match unit {
            "" => return Err(format!("missing unit in duration '{value}'")),
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => NANOS_PER_MILLI,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            other => return Err(format!("unknown unit '{other}' in duration '{value}'")),
        };
        let nanos = scale_decimal(number, nanos_per_unit)
            .ok_or_else(|| format!("invalid duration '{value}'"))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration '{value}' is out of range"))?;
        rest = remainder;
    }

    if negative && total > 0 {
        return Err(format!("negative duration '{value}' is not allowed"));
    }
    let nanos =
        u64::try_from(total).map_err(|_| format!("duration '{value}' is out of range"))?;
    Ok(Duration::from_nanos(nanos))
}

/// Truncates a duration to whole milliseconds.
pub(crate) fn whole_millis(duration: Duration) -> Duration {
    let millis = duration.as_nanos() / NANOS_PER_MILLI;
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Parses the boolean spellings accepted by Go's `strconv.ParseBool`.
pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(format!("invalid boolean '{value}'")),
    }
}

/// Parses an unsigned decimal count. Signs are rejected.
pub(crate) fn parse_count(value: &str) -> Result<u64, String> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(format!("invalid count '{value}'"));
    }
    value
        .parse::<u64>()
        .map_err(|_| format!("count '{value}' is out of range"))
}

/// Multiplies a decimal literal (`12` or `1.25`) by `unit`, truncating.
fn scale_decimal(number: &str, unit: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.contains('.') {
        return None;
    }
    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().ok()?
    };
    let mut scaled = whole_value.checked_mul(unit)?;

    // Digits past the 18th cannot change a nanosecond or byte count.
    let fraction = fraction.get(..fraction.len().min(18)).unwrap_or(fraction);
    if !fraction.is_empty() {
        let numerator = fraction.parse::<u128>().ok()?;
        let exponent = u32::try_from(fraction.len()).ok()?;
        let denominator = 10_u128.checked_pow(exponent)?;
        scaled = scaled.checked_add(numerator.checked_mul(unit)?.checked_div(denominator)?)?;
    }
    Some(scaled)
}
