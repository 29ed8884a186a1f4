//! Helpers for reading loosely-shaped JSON records.
//!
//! Records arrive straight from the REST API and are never validated, so
//! every accessor here tolerates missing fields and wrong types.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Look up `key` in a record.
///
/// An exact key match wins; otherwise `key` is treated as a dotted path.
/// An empty key addresses the record itself, so arrays of scalars can be
/// sorted directly.
pub(crate) fn lookup<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(record);
    }
    if let Some(value) = record.get(key) {
        return Some(value);
    }
    if !key.contains('.') {
        return None;
    }
    key.split('.')
        .try_fold(record, |current, segment| current.get(segment))
}

/// Field value, with JSON `null` treated as absent.
pub(crate) fn present<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    lookup(record, key).filter(|v| !v.is_null())
}

/// String field, or `None` when missing or not a string.
pub(crate) fn str_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// Numeric reading of a value: numbers, and strings that parse as numbers.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Monetary amount of a value. Anything that is not a finite number is zero.
pub fn money(value: Option<&Value>) -> f64 {
    value.and_then(as_number).unwrap_or(0.0)
}

/// Equality that treats `1` and `1.0` as the same number.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total ascending order over JSON values.
///
/// Numbers compare numerically and strings case-insensitively (ties broken
/// by code point). Values of different types order by type.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Parse a timestamp as sent by the API.
///
/// Accepts RFC 3339 (normalised to UTC), naive `YYYY-MM-DDTHH:MM:SS[.f]`
/// with `T` or a space, and bare `YYYY-MM-DD` (midnight).
pub fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// First parsable timestamp among `keys`, in order.
///
/// A key that is present but unparsable still falls through to the next one.
pub(crate) fn record_instant(record: &Value, keys: &[&str]) -> Option<NaiveDateTime> {
    keys.iter()
        .filter_map(|key| str_field(record, key))
        .find_map(parse_instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_money_never_yields_nan() {
        assert_eq!(money(Some(&json!(120.5))), 120.5);
        assert_eq!(money(Some(&json!("99.90"))), 99.9);
        assert_eq!(money(Some(&json!("n/a"))), 0.0);
        assert_eq!(money(Some(&json!(null))), 0.0);
        assert_eq!(money(Some(&json!({"amount": 3}))), 0.0);
        assert_eq!(money(None), 0.0);
    }

    #[test]
    fn test_lookup_paths() {
        let record = json!({"hotel": {"city": "Hue"}, "a.b": 1});
        assert_eq!(lookup(&record, "hotel.city"), Some(&json!("Hue")));
        assert_eq!(lookup(&record, "a.b"), Some(&json!(1)));
        assert_eq!(lookup(&record, "hotel.zip"), None);
        assert_eq!(lookup(&json!(7), ""), Some(&json!(7)));
    }

    #[test]
    fn test_parse_instant_formats() {
        let midnight = parse_instant("2025-03-01").unwrap();
        assert_eq!(midnight.to_string(), "2025-03-01 00:00:00");

        let naive = parse_instant("2025-03-01T14:30:00").unwrap();
        assert_eq!(naive.to_string(), "2025-03-01 14:30:00");

        let offset = parse_instant("2025-03-01T14:30:00+07:00").unwrap();
        assert_eq!(offset.to_string(), "2025-03-01 07:30:00");

        assert!(parse_instant("tomorrow").is_none());
    }

    #[test]
    fn test_compare_values_order() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("apple"), &json!("Banana")), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("B")), Ordering::Greater);
        assert_eq!(compare_values(&json!(1), &json!("1")), Ordering::Less);
    }

    #[test]
    fn test_record_instant_falls_back() {
        let booking = json!({"checkInDate": null, "createdAt": "2024-12-24"});
        let instant = record_instant(&booking, &["checkInDate", "createdAt"]).unwrap();
        assert_eq!(instant.to_string(), "2024-12-24 00:00:00");
    }
}
