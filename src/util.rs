//! Small utility helpers used across modules.

use chrono::{NaiveDate, SecondsFormat, Utc};

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings (respects char boundaries).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

/// The span from the first `{` to the last `}`; models like to wrap JSON in prose or fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  if end < start { None } else { Some(&text[start..=end]) }
}

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
  (x * 10.0).round() / 10.0
}

pub fn now_rfc3339() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_millis() -> u64 {
  Utc::now().timestamp_millis().max(0) as u64
}

pub fn today() -> NaiveDate {
  Utc::now().date_naive()
}
