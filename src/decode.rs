//! Capture-line decoding.
//!
//! Each line of a capture file is one frame as received from the upstream
//! feed. Most lines are JSON, but the capture writer sometimes emits the
//! feed client's literal repr instead: single-quoted strings, `True`,
//! `False`, `None`. Decoding therefore runs an ordered chain of
//! [`DecodeStrategy`]s and keeps the first document that parses.
//!
//! A document qualifies as feed data only when it looks like
//!
//! ```text
//! {"M": [{"M": "feed", "A": ["<category>", <payload>, ...]}, ...]}
//! ```
//!
//! Every other shape is dropped. Nothing in this module returns an error or
//! panics on bad input; undecodable lines simply produce no updates.

use serde_json::{Map, Value};
use tracing::trace;

use crate::types::CategoryUpdate;

/// One way of turning a raw line into a structured document.
pub trait DecodeStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Parse the line, or `None` if this strategy cannot read it.
    fn parse(&self, line: &str) -> Option<Value>;
}

/// Standard JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictJson;

impl DecodeStrategy for StrictJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, line: &str) -> Option<Value> {
        serde_json::from_str(line).ok()
    }
}

/// Literal-syntax documents with non-standard quoting.
///
/// The line is first normalised (single-quoted strings become double-quoted,
/// `True`/`False`/`None` become `true`/`false`/`null`) and then read as a YAML
/// flow document, which accepts the escape sequences literal reprs use.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveLiteral;

impl DecodeStrategy for PermissiveLiteral {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn parse(&self, line: &str) -> Option<Value> {
        let normalized = normalize_literal(line)?;
        serde_yaml_ng::from_str(&normalized).ok()
    }
}

/// Rewrite literal syntax into a YAML flow document.
///
/// Returns `None` for an unterminated string.
pub fn normalize_literal(line: &str) -> Option<String> {
    let mut out = String::with_capacity(line.len() + 8);
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' => {
                out.push('"');
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            // `\'` has no YAML equivalent and needs no escape once double-quoted
                            '\'' => out.push('\''),
                            escaped => {
                                out.push('\\');
                                out.push(escaped);
                            }
                        },
                        c if c == ch => break,
                        '"' => out.push_str("\\\""),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => &word,
                });
            }
            // Remove control characters except tab
            '\x00'..='\x08' | '\x0A'..='\x1F' => continue,
            c => out.push(c),
        }
    }

    Some(out)
}

/// Decodes capture lines into [`CategoryUpdate`]s.
pub struct LineDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(vec![Box::new(StrictJson), Box::new(PermissiveLiteral)])
    }
}

impl std::fmt::Debug for LineDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("LineDecoder").field("strategies", &names).finish()
    }
}

impl LineDecoder {
    /// Decoder trying `strategies` in order
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Parse a line with the first strategy that accepts it.
    pub fn parse_document(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.strategies.iter().find_map(|strategy| {
            let parsed = strategy.parse(line);
            if parsed.is_some() {
                trace!(strategy = strategy.name(), "Parsed capture line");
            }
            parsed
        })
    }

    /// First feed update carried by the line.
    pub fn decode(&self, line: &str) -> Option<CategoryUpdate> {
        self.decode_all(line).into_iter().next()
    }

    /// Every feed update carried by the line, in message order.
    pub fn decode_all(&self, line: &str) -> Vec<CategoryUpdate> {
        match self.parse_document(line) {
            Some(document) => feed_updates(document),
            None => {
                trace!(len = line.len(), "Dropping undecodable capture line");
                Vec::new()
            }
        }
    }
}

/// Extract feed messages from a decoded frame.
fn feed_updates(document: Value) -> Vec<CategoryUpdate> {
    let Value::Object(mut frame) = document else {
        return Vec::new();
    };
    let Some(Value::Array(messages)) = frame.remove("M") else {
        return Vec::new();
    };
    messages
        .into_iter()
        .filter_map(|message| match message {
            Value::Object(message) => feed_update(message),
            _ => None,
        })
        .collect()
}

fn feed_update(mut message: Map<String, Value>) -> Option<CategoryUpdate> {
    if message.get("M").and_then(Value::as_str) != Some("feed") {
        return None;
    }
    let Some(Value::Array(args)) = message.remove("A") else {
        return None;
    };
    if args.len() < 2 {
        return None;
    }
    let mut args = args.into_iter();
    let Some(Value::String(category)) = args.next() else {
        return None;
    };
    let payload = args.next()?;
    Some(CategoryUpdate::new(category, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn decodes_strict_json_feed_frames() {
        let line = r#"{"M":[{"H":"Streaming","M":"feed","A":["TimingData",{"Lines":{"44":{"Position":"1"}}},"2024-03-02T15:04:05.123Z"]}]}"#;
        let update = LineDecoder::default().decode(line).expect("feed frame should decode");
        assert_eq!(update.category, "TimingData");
        assert_eq!(update.payload, json!({"Lines": {"44": {"Position": "1"}}}));
    }

    #[test]
    fn decodes_literal_frames_with_single_quotes_and_keywords() {
        let line = "{'M': [{'H': 'Streaming', 'M': 'feed', 'A': ['TrackStatus', {'Status': '1', 'Message': 'AllClear', 'Flag': None, 'Yellow': False}]}]}";
        let update = LineDecoder::default().decode(line).expect("literal frame should decode");
        assert_eq!(update.category, "TrackStatus");
        assert_eq!(
            update.payload,
            json!({"Status": "1", "Message": "AllClear", "Flag": null, "Yellow": false})
        );
    }

    #[test]
    fn literal_strings_keep_embedded_quotes() {
        let line = r#"{'M': [{'M': 'feed', 'A': ['RaceControlMessages', {'Message': "DRIVER'S LAP DELETED", 'Note': 'say "hi"', 'Esc': 'it\'s'}]}]}"#;
        let update = LineDecoder::default().decode(line).expect("should decode");
        assert_eq!(update.payload["Message"], "DRIVER'S LAP DELETED");
        assert_eq!(update.payload["Note"], "say \"hi\"");
        assert_eq!(update.payload["Esc"], "it's");
    }

    #[test]
    fn keywords_inside_strings_are_untouched() {
        let normalized = normalize_literal("{'Status': 'None', 'Flag': None}").unwrap();
        assert_eq!(normalized, r#"{"Status": "None", "Flag": null}"#);
    }

    #[test]
    fn decode_all_returns_every_feed_message_in_order() {
        let line = json!({"M": [
            {"M": "feed", "A": ["WeatherData", {"AirTemp": "24.1"}]},
            {"M": "ping", "A": ["ignored", {}]},
            {"M": "feed", "A": ["LapCount", {"CurrentLap": 3}]},
        ]})
        .to_string();

        let categories: Vec<_> =
            LineDecoder::default().decode_all(&line).into_iter().map(|u| u.category).collect();
        assert_eq!(categories, ["WeatherData", "LapCount"]);
    }

    #[test]
    fn rejects_frames_without_feed_shape() {
        let decoder = LineDecoder::default();
        for line in [
            r#"{"C":"d-1","M":[]}"#,
            r#"{"M":"feed"}"#,
            r#"{"M":[{"M":"feed","A":["TimingData"]}]}"#,
            r#"{"M":[{"M":"feed","A":"TimingData"}]}"#,
            r#"{"M":[{"M":"other","A":["TimingData",{}]}]}"#,
            r#"{"M":[{"M":"feed","A":[7,{}]}]}"#,
            r#"{"R":{"TimingData":{}},"I":"1"}"#,
            r#"["TimingData", {}]"#,
            "plain text",
            "42",
        ] {
            assert_eq!(decoder.decode(line), None, "line should be rejected: {line}");
        }
    }

    #[test]
    fn bad_input_never_decodes() {
        let decoder = LineDecoder::default();
        assert_eq!(decoder.decode(""), None);
        assert_eq!(decoder.decode("   \n"), None);
        assert_eq!(decoder.decode(r#"{"M":[{"M":"feed","A":["TimingData",{"Li"#), None);
        assert_eq!(decoder.decode("{'M': [{'M': 'feed"), None);
        assert_eq!(decoder.decode("\u{0}\u{1}\u{fffd}\u{7f}"), None);
    }

    #[test]
    fn strategies_run_in_order_and_first_success_wins() {
        struct Fixed(&'static str, Value);
        impl DecodeStrategy for Fixed {
            fn name(&self) -> &'static str {
                self.0
            }
            fn parse(&self, _line: &str) -> Option<Value> {
                Some(self.1.clone())
            }
        }

        let decoder = LineDecoder::new(vec![
            Box::new(StrictJson),
            Box::new(Fixed("first", json!({"M": [{"M": "feed", "A": ["A", 1]}]}))),
            Box::new(Fixed("second", json!({"M": [{"M": "feed", "A": ["B", 2]}]}))),
        ]);
        assert_eq!(decoder.decode("not json").map(|u| u.category), Some("A".to_string()));
    }

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(line in ".*") {
            let _ = LineDecoder::default().decode_all(&line);
        }

        #[test]
        fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let line = String::from_utf8_lossy(&bytes);
            prop_assert_eq!(LineDecoder::default().decode(&line), None);
        }

        #[test]
        fn truncated_frames_never_decode(cut in 1usize..60) {
            let line = r#"{"M":[{"M":"feed","A":["TimingData",{"Lines":{"44":{"Position":"1"}}}]}]}"#;
            let cut = cut.min(line.len() - 1);
            prop_assert_eq!(LineDecoder::default().decode(&line[..cut]), None);
        }
    }
}
