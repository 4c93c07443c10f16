// crates/exam-catalog-config/src/duration.rs
// ============================================================================
// Module: Duration Parsing
// Description: Go-style duration strings (`100ms`, `1h30m`).
// Purpose: Decode timeouts from environment variables and TOML.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A duration is a sequence of decimal numbers each followed by a unit:
//! `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted. Signs
//! are rejected; durations are never negative. In TOML a duration may also
//! be an integer count of milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserializer;
use serde::de;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Nanoseconds per unit, longest suffixes first so `ms` wins over `m`.
const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

/// Parses a Go-style duration string.
///
/// # Errors
///
/// Returns a message naming the malformed input.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err("duration must be non-empty".to_string());
    }
    let mut rest = text;
    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len =
            rest.find(|ch: char| !(ch.is_ascii_digit() || ch == '.')).unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration \"{input}\""));
        }
        let (number, after) = rest.split_at(number_len);
        let Some((unit, scale)) = UNITS
            .iter()
            .filter(|(unit, _)| after.starts_with(unit))
            .max_by_key(|(unit, _)| unit.len())
        else {
            return Err(format!("missing or unknown unit in duration \"{input}\""));
        };
        let nanos =
            scaled(number, *scale).ok_or_else(|| format!("invalid duration \"{input}\""))?;
        total_nanos = total_nanos
            .checked_add(nanos)
            .ok_or_else(|| format!("duration \"{input}\" overflows"))?;
        rest = &after[unit.len() ..];
    }
    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration \"{input}\" overflows"))?;
    let nanos = u32::try_from(total_nanos % 1_000_000_000)
        .map_err(|_| format!("duration \"{input}\" overflows"))?;
    Ok(Duration::new(secs, nanos))
}

/// Scales a decimal number by `scale` nanoseconds, truncating below 1 ns.
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.contains('.') {
        return None;
    }
    let whole_value: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole_value.checked_mul(scale)?;
    let mut place = scale;
    for digit in fraction.chars() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit.to_digit(10)?) * place)?;
    }
    Some(nanos)
}

// ============================================================================
// SECTION: Serde
// ============================================================================

/// Deserializes a duration from a Go-style string or integer milliseconds.
///
/// # Errors
///
/// Returns a deserialization error for malformed input.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

/// Visitor accepting strings and non-negative integers.
struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a duration string like \"30s\" or integer milliseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
        parse_duration(value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
        u64::try_from(value)
            .map(Duration::from_millis)
            .map_err(|_| E::custom("duration must not be negative"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_and_compound_units() {
        assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("30m"), Ok(Duration::from_secs(1_800)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3_600)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1_500)));
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "10", "s", "-1s", "1x", "1..5s", "1h 30m"] {
            assert!(parse_duration(input).is_err(), "\"{input}\" should be rejected");
        }
    }
}
