use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;

/// Calendar-day format used by every dated record.
pub(crate) const DAY_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn normalize_phone(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
}

pub(crate) fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT).ok()
}

pub(crate) fn today() -> String {
    Local::now().date_naive().format(DAY_FORMAT).to_string()
}

/// First day of the current month, `YYYY-MM-DD`.
pub(crate) fn first_day_of_month() -> String {
    let now = Local::now().date_naive();
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .unwrap_or(now)
        .format(DAY_FORMAT)
        .to_string()
}

// ---------------------------------------------------------------------------
// Row field readers
//
// Remote rows arrive as JSON objects. NUMERIC columns are serialized as
// strings and unquoted identifiers fold to lowercase, so every reader takes
// a list of candidate keys and accepts numbers written as strings.
// ---------------------------------------------------------------------------

pub(crate) fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(Value::as_str) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(n) = s.trim().parse::<f64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn value_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Some(i);
                }
                if let Some(f) = n.as_f64() {
                    return Some(f as i64);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(n) = s.trim().parse::<i64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn value_bool(v: &Value, keys: &[&str]) -> Option<bool> {
    for key in keys {
        let value = match v.get(*key) {
            Some(value) => value,
            None => continue,
        };

        if let Some(flag) = value.as_bool() {
            return Some(flag);
        }
        if let Some(flag) = value.as_i64() {
            return Some(flag == 1);
        }
        if let Some(flag) = value.as_str() {
            let normalized = flag.trim().to_ascii_lowercase();
            if matches!(normalized.as_str(), "true" | "t" | "1" | "yes" | "on") {
                return Some(true);
            }
            if matches!(normalized.as_str(), "false" | "f" | "0" | "no" | "off") {
                return Some(false);
            }
        }
    }
    None
}
