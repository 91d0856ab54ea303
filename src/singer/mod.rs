//! Minimal Singer message framing: one JSON object per line.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{Result, TargetError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum SingerMessage {
    Record {
        stream: String,
        record: Value,
        #[serde(default)]
        time_extracted: Option<String>,
    },
    Schema {
        stream: String,
        #[serde(default)]
        schema: Value,
        #[serde(default)]
        key_properties: Vec<String>,
    },
    State {
        value: Value,
    },
    // ACTIVATE_VERSION, BATCH and anything newer
    #[serde(other)]
    Other,
}

/// Parse one input line. Blank lines yield `None`; anything unparseable is a protocol error.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<SingerMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| TargetError::Protocol(format!("line {}: invalid Singer message: {}", line_no, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_record_schema_and_state() {
        let rec = parse_line(r#"{"type":"RECORD","stream":"Products","record":{"name":"Mug"}}"#, 1).unwrap();
        assert_eq!(
            rec,
            Some(SingerMessage::Record { stream: "Products".into(), record: json!({"name": "Mug"}), time_extracted: None })
        );

        let schema = parse_line(r#"{"type":"SCHEMA","stream":"Products","schema":{},"key_properties":["id"]}"#, 2).unwrap();
        assert!(matches!(schema, Some(SingerMessage::Schema { key_properties, .. }) if key_properties == vec!["id"]));

        let state = parse_line(r#"{"type":"STATE","value":{"bookmarks":{}}}"#, 3).unwrap();
        assert_eq!(state, Some(SingerMessage::State { value: json!({"bookmarks": {}}) }));
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let msg = parse_line(r#"{"type":"ACTIVATE_VERSION","stream":"Products","version":1}"#, 1).unwrap();
        assert_eq!(msg, Some(SingerMessage::Other));
    }

    #[test]
    fn blank_lines_are_ignored_and_garbage_is_an_error() {
        assert_eq!(parse_line("   ", 1).unwrap(), None);
        assert!(matches!(parse_line("{not json", 7), Err(TargetError::Protocol(m)) if m.starts_with("line 7")));
    }
}
