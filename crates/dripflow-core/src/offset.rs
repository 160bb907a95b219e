//! Parsing of an event's `offset_interval`.
//!
//! Three spellings are accepted:
//!
//! | form | example | meaning |
//! |------|---------|---------|
//! | integer seconds | `"86400"` | one day |
//! | ISO 8601 duration | `"P1D"`, `"PT1H30M"`, `"P1W"` | one day, 90 minutes, a week |
//! | short phrase | `"1 day"`, `"3 hours"` | one day, three hours |
//!
//! ISO years and months have no fixed length; they are taken as 365 and 30
//! days so that an offset always means the same number of seconds.

use chrono::Duration;

use crate::{Error, Result};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Parse `raw` into a non-negative duration.
///
/// The error message always carries the raw value so a bad row can be found.
pub fn parse_offset(raw: &str) -> Result<Duration> {
  let seconds = parse_seconds(raw.trim()).ok_or_else(|| {
    Error::Validation(format!(
      "invalid offset_interval format: '{raw}'; expected integer seconds \
       (e.g. '86400') or an ISO 8601 duration (e.g. 'P1D')"
    ))
  })?;
  Duration::try_seconds(seconds).ok_or_else(|| {
    Error::Validation(format!("offset_interval '{raw}' is out of range"))
  })
}

fn parse_seconds(s: &str) -> Option<i64> {
  if s.is_empty() {
    return None;
  }
  if s.bytes().all(|b| b.is_ascii_digit()) {
    return s.parse().ok();
  }
  if let Some(rest) = s.strip_prefix('P') {
    return parse_iso8601(rest);
  }
  parse_phrase(s)
}

/// `rest` is everything after the leading `P`.
fn parse_iso8601(rest: &str) -> Option<i64> {
  let (date_part, time_part) = match rest.split_once('T') {
    Some((d, t)) if !t.is_empty() => (d, Some(t)),
    Some(_) => return None,
    None => (rest, None),
  };

  let date = sum_components(date_part, |unit| match unit {
    'Y' => Some(YEAR),
    'M' => Some(MONTH),
    'W' => Some(WEEK),
    'D' => Some(DAY),
    _ => None,
  })?;
  let time = match time_part {
    Some(t) => sum_components(t, |unit| match unit {
      'H' => Some(HOUR),
      'M' => Some(MINUTE),
      'S' => Some(1),
      _ => None,
    })?,
    None => 0,
  };

  if date_part.is_empty() && time_part.is_none() {
    return None;
  }
  date.checked_add(time)
}

/// Sum `<digits><unit>` pairs; units must appear in the order `unit_len`
/// lists them and at most once each, which the strictly-decreasing length
/// check enforces.
fn sum_components(s: &str, unit_len: impl Fn(char) -> Option<i64>) -> Option<i64> {
  let mut total: i64 = 0;
  let mut digits = String::new();
  let mut last_len = i64::MAX;

  for c in s.chars() {
    if c.is_ascii_digit() {
      digits.push(c);
      continue;
    }
    let len = unit_len(c)?;
    if digits.is_empty() || len >= last_len {
      return None;
    }
    let n: i64 = digits.parse().ok()?;
    total = total.checked_add(n.checked_mul(len)?)?;
    digits.clear();
    last_len = len;
  }

  digits.is_empty().then_some(total)
}

fn parse_phrase(s: &str) -> Option<i64> {
  let mut parts = s.split_whitespace();
  let n: i64 = parts.next()?.parse().ok()?;
  let unit = parts.next()?.to_ascii_lowercase();
  if parts.next().is_some() || n < 0 {
    return None;
  }
  let len = match unit.trim_end_matches('s') {
    "second" | "sec" => 1,
    "minute" | "min" => MINUTE,
    "hour" => HOUR,
    "day" => DAY,
    "week" => WEEK,
    _ => return None,
  };
  n.checked_mul(len)
}
