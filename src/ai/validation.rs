//! Response Parsing
//!
//! Turns chunk replies into item lists. Models wrap JSON in markdown fences,
//! surround it with prose, leave trailing commas or stop mid-array when they
//! run out of output tokens; each case is repaired before giving up.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{QuizloomError, Result};

/// Keys under which an object reply may carry its item array
const LIST_KEYS: [&str; 4] = ["items", "subjects", "topics", "patterns"];

// =============================================================================
// Items
// =============================================================================

/// One named item discovered in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Any other fields the model returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiscoveredItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            extra: Map::new(),
        }
    }

    /// Key used for cross-chunk deduplication
    pub fn dedup_key(&self) -> String {
        normalize_name(&self.name)
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Drop items whose trimmed, lowercased name was already seen; first wins
///
/// Kept items have their name trimmed.
pub fn dedup_items(items: impl IntoIterator<Item = DiscoveredItem>) -> Vec<DiscoveredItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.dedup_key()))
        .map(|mut item| {
            let trimmed = item.name.trim();
            if trimmed.len() != item.name.len() {
                item.name = trimmed.to_string();
            }
            item
        })
        .collect()
}

/// Parse a model reply into items
///
/// Accepts an array of objects carrying `name`, an array of strings, or an
/// object wrapping such an array under `items`, `subjects`, `topics` or
/// `patterns`. Entries without a usable name are skipped.
pub fn parse_item_list(content: &str) -> Result<Vec<DiscoveredItem>> {
    let value = extract_json(content)?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => LIST_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(entries)) => Some(entries),
                _ => None,
            })
            .ok_or_else(|| {
                QuizloomError::Parse(format!(
                    "Expected an item array under one of: {}",
                    LIST_KEYS.join(", ")
                ))
            })?,
        other => {
            return Err(QuizloomError::Parse(format!(
                "Expected an item array, got {}",
                json_kind(&other)
            )));
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(DiscoveredItem::named(name)),
            Value::Object(_) => serde_json::from_value::<DiscoveredItem>(entry).ok(),
            _ => None,
        })
        .filter(|item| !item.name.trim().is_empty())
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// JSON Extraction
// =============================================================================

/// Parse the JSON value in a model reply, repairing common damage
pub fn extract_json(content: &str) -> Result<Value> {
    let cleaned = strip_code_fences(content.trim().trim_start_matches('\u{feff}'));

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    let candidate = outermost_value(cleaned).ok_or_else(|| {
        QuizloomError::Parse(format!("No JSON found in response: {}", preview(cleaned)))
    })?;
    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        debug!("JSON extracted from surrounding text");
        return Ok(value);
    }

    let repaired = close_unbalanced(&remove_trailing_commas(candidate));
    serde_json::from_str::<Value>(&repaired)
        .inspect(|_| debug!("JSON repaired"))
        .map_err(|e| {
            QuizloomError::Parse(format!("Unrepairable JSON ({}): {}", e, preview(cleaned)))
        })
}

fn preview(s: &str) -> String {
    let head: String = s.chars().take(120).collect();
    if head.len() < s.len() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Strip a surrounding ```json ... ``` fence
fn strip_code_fences(s: &str) -> &str {
    let mut body = s;
    if body.starts_with("```") {
        body = body.find('\n').map_or("", |nl| &body[nl + 1..]);
    }
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Lexer state shared by the bracket scanners
#[derive(Default)]
struct Scan {
    in_string: bool,
    escape: bool,
}

impl Scan {
    /// Feed one char; returns true when it is structural (outside strings)
    fn structural(&mut self, ch: char) -> bool {
        if self.escape {
            self.escape = false;
            return false;
        }
        match ch {
            '\\' if self.in_string => {
                self.escape = true;
                false
            }
            '"' => {
                self.in_string = !self.in_string;
                false
            }
            _ => !self.in_string,
        }
    }
}

/// From the first `{` or `[` to its matching closer, or to the end when unclosed
fn outermost_value(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let mut scan = Scan::default();
    let mut depth = 0usize;

    for (i, ch) in s[start..].char_indices() {
        if !scan.structural(ch) {
            continue;
        }
        match ch {
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    Some(&s[start..])
}

/// Remove commas directly before `]` or `}`
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut scan = Scan::default();
    let mut out = String::with_capacity(s.len());

    for (i, &ch) in chars.iter().enumerate() {
        if scan.structural(ch) && ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']' | '}')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Close an unterminated string, drop a dangling separator and close
/// open brackets innermost first
fn close_unbalanced(s: &str) -> String {
    let mut scan = Scan::default();
    let mut open = Vec::new();

    for ch in s.chars() {
        if !scan.structural(ch) {
            continue;
        }
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut out = s.to_string();
    if scan.in_string {
        out.push('"');
    }
    if open.is_empty() {
        return out;
    }

    let trimmed = out.trim_end().trim_end_matches([',', ':']).trim_end();
    let mut out = trimmed.to_string();
    while let Some(closer) = open.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_array_of_objects() {
        let items = parse_item_list(
            r#"[{"name": "Algebra", "description": "Equations"}, {"name": "Geometry", "level": 2}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description.as_deref(), Some("Equations"));
        assert_eq!(items[1].extra.get("level"), Some(&json!(2)));
    }

    #[test]
    fn test_array_of_strings_and_wrapped_object() {
        let items = parse_item_list(r#"["Algebra", "", "Calculus"]"#).unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Algebra", "Calculus"]);

        let items = parse_item_list(r#"{"subjects": [{"name": "Optics"}]}"#).unwrap();
        assert_eq!(items[0].name, "Optics");
    }

    #[test]
    fn test_fenced_reply_with_prose() {
        let reply = "Here are the topics:\n```json\n[{\"name\": \"Vectors\"}]\n```";
        // Prose before the fence: fence stripping does not apply, extraction does
        assert_eq!(parse_item_list(reply).unwrap()[0].name, "Vectors");

        let fenced = "```json\n{\"topics\": [\"Limits\"]}\n```";
        assert_eq!(parse_item_list(fenced).unwrap()[0].name, "Limits");
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let value = extract_json(r#"{"items": [{"name": "A"}, {"name": "B"},],}"#).unwrap();
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_reply_repaired() {
        let value = extract_json(r#"[{"name": "Algebra"}, {"name": "Geom"#).unwrap();
        assert_eq!(value, json!([{"name": "Algebra"}, {"name": "Geom"}]));

        let value = extract_json(r#"{"items": [{"name": "Algebra"},"#).unwrap();
        assert_eq!(value, json!({"items": [{"name": "Algebra"}]}));
    }

    #[test]
    fn test_commas_inside_strings_untouched() {
        let value = extract_json(r#"[{"name": "a ,]"}]"#).unwrap();
        assert_eq!(value[0]["name"], "a ,]");
    }

    #[test]
    fn test_unparseable_reply() {
        assert!(matches!(
            parse_item_list("I could not find any subjects."),
            Err(QuizloomError::Parse(_))
        ));
        assert!(matches!(
            parse_item_list(r#"{"unrelated": true}"#),
            Err(QuizloomError::Parse(_))
        ));
        assert!(parse_item_list("42").is_err());
    }

    #[test]
    fn test_dedup_is_case_and_whitespace_insensitive() {
        let items = vec![
            DiscoveredItem::named("Algebra"),
            DiscoveredItem::named("  algebra"),
            DiscoveredItem::named("ALGEBRA "),
            DiscoveredItem::named("Geometry"),
        ];
        let merged = dedup_items(items);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Algebra");
        assert_eq!(merged[1].name, "Geometry");
    }

    #[test]
    fn test_dedup_trims_kept_name() {
        let merged = dedup_items(vec![
            DiscoveredItem::named("  algebra\n"),
            DiscoveredItem::named("Algebra"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "algebra");
    }
}
