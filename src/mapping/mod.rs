use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Drop `null` and `""` values from every object in the payload, recursively.
pub fn clean_payload(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !matches!(v, Value::Null) && v.as_str() != Some(""))
                .map(|(k, v)| (k, clean_payload(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_payload).collect()),
        other => other,
    }
}

/// Normalize an inbound timestamp to `YYYY-MM-DDTHH:MM:SS±HH:MM`.
/// Naive timestamps are taken as UTC; unparseable input is passed through untouched.
pub fn format_datetime(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return render(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return render(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return render(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    raw.to_string()
}

fn render(dt: DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// "Ada King Lovelace" -> ("Ada", "King Lovelace").
pub fn split_customer_name(full: Option<&str>) -> (String, String) {
    let Some(full) = full.map(str::trim).filter(|s| !s.is_empty()) else {
        return (String::new(), String::new());
    };
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Strip everything but letters, digits and underscores, for loose name matching.
pub fn alnum(input: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let re = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("static regex"));
    re.replace_all(input, "").into_owned()
}

/// WooCommerce wants prices and dimensions as strings.
pub fn to_api_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
