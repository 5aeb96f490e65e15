//! Sort expression parsing
//!
//! Two grammars, chosen by the first non-space character:
//!
//! - `{"price":"d","name":"a"}` / `["price","name"]`: structured JSON form
//! - `price_desc,name asc,title`: comma-separated keys with an optional
//!   `_`/space-separated direction suffix
//!
//! Direction words are `a`/`asc`/`ascending` and `d`/`desc`/`descending`,
//! case-insensitive. Anything else defers to the attribute's declared default.

use serde_json::Value;

use super::operation::RequestedDirection;

/// One requested ordering, before attribute resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Query name, possibly dotted (`author.name`)
    pub key: String,
    pub direction: RequestedDirection,
    /// Position in the request, used as the tie-break order
    pub position: usize,
}

const SUFFIXES: [(&str, RequestedDirection); 6] = [
    ("ascending", RequestedDirection::Asc),
    ("descending", RequestedDirection::Desc),
    ("asc", RequestedDirection::Asc),
    ("desc", RequestedDirection::Desc),
    ("a", RequestedDirection::Asc),
    ("d", RequestedDirection::Desc),
];

/// Parse a raw `sort_by` value
///
/// A key requested twice keeps its first position and its last direction.
/// Malformed JSON yields no keys.
pub fn parse(raw: &str) -> Vec<SortKey> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let pairs = if raw.starts_with('{') || raw.starts_with('[') {
        parse_json(raw)
    } else {
        parse_simple(raw)
    };

    let mut keys: Vec<SortKey> = Vec::new();
    for (key, direction) in pairs {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        match keys.iter_mut().find(|existing| existing.key == key) {
            Some(existing) => existing.direction = direction,
            None => {
                let position = keys.len();
                keys.push(SortKey {
                    key: key.to_string(),
                    direction,
                    position,
                });
            }
        }
    }
    keys
}

fn parse_json(raw: &str) -> Vec<(String, RequestedDirection)> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(key, word)| (key, direction_of(&word)))
            .collect(),
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(key) => Some((key, RequestedDirection::Default)),
                Value::Object(map) => map
                    .into_iter()
                    .next()
                    .map(|(key, word)| (key, direction_of(&word))),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn direction_of(word: &Value) -> RequestedDirection {
    match word {
        Value::String(s) => RequestedDirection::from_word(s),
        _ => RequestedDirection::Default,
    }
}

fn parse_simple(raw: &str) -> Vec<(String, RequestedDirection)> {
    raw.split(',')
        .map(|part| split_suffix(part.trim()))
        .collect()
}

/// Strip a trailing direction suffix such as `_desc` or ` a`
fn split_suffix(key: &str) -> (String, RequestedDirection) {
    let lower = key.to_lowercase();
    for (word, direction) in SUFFIXES {
        for separator in ['_', ' '] {
            let suffix = format!("{}{}", separator, word);
            if lower.ends_with(&suffix) && lower.len() > suffix.len() {
                let stem = &key[..key.len() - suffix.len()];
                return (stem.trim_end().to_string(), direction);
            }
        }
    }
    (key.to_string(), RequestedDirection::Default)
}
