//! Entity traits defining what the engine needs from persisted records
//!
//! The engine never knows concrete record types. It reads and writes fields
//! by key, records errors, and walks associations through these traits; the
//! backing store supplies the implementation.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

use super::error::AttributeError;

/// Ordered field → messages multimap
///
/// Keys keep first-insertion order so rendered error lists are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: IndexMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Key used for errors on the entity as a whole
    pub const BASE: &'static str = "base";

    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message; repeating an identical message for a key is a no-op
    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        let messages = self.messages.entry(key.into()).or_default();
        if !messages.contains(&message) {
            messages.push(message);
        }
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.messages.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.messages.get(key).is_some_and(|m| !m.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.values().all(Vec::is_empty)
    }

    /// Total number of messages across all keys
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.messages
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(k, m)| (k.as_str(), m.as_slice()))
    }

    /// Union `other` into `self` without dropping anything either side holds
    pub fn merge(&mut self, other: ValidationErrors) {
        for (key, messages) in other.messages {
            for message in messages {
                self.add(key.clone(), message);
            }
        }
    }
}

/// Field-level access to a persisted (or not yet persisted) record
///
/// Object-safe so metadata callbacks can receive `&dyn Entity`.
pub trait Entity: fmt::Debug + Send + Sync {
    /// The registered entity type name (e.g. "book")
    fn entity_type(&self) -> &str;

    /// Primary key, absent until the record has been persisted
    fn primary_key(&self) -> Option<Value>;

    fn is_new(&self) -> bool {
        self.primary_key().is_none()
    }

    /// Read a plain field
    fn field(&self, key: &str) -> Option<Value>;

    /// Whether the record has a writable field with this key
    fn has_field(&self, key: &str) -> bool;

    /// Write a plain field, coercing as the record sees fit
    fn set_field(&mut self, key: &str, value: Value) -> Result<(), AttributeError>;

    fn errors(&self) -> &ValidationErrors;

    fn errors_mut(&mut self) -> &mut ValidationErrors;

    fn add_error(&mut self, key: &str, message: &str) {
        self.errors_mut().add(key, message);
    }

    fn clear_errors(&mut self) {
        self.errors_mut().clear();
    }
}

/// Owned association access for records of one uniform store type
pub trait EntityGraph: Entity + Clone + Sized {
    fn to_one(&self, key: &str) -> Option<&Self>;

    fn to_one_mut(&mut self, key: &str) -> Option<&mut Self>;

    fn set_to_one(&mut self, key: &str, child: Option<Self>);

    fn to_many(&self, key: &str) -> &[Self];

    fn to_many_mut(&mut self, key: &str) -> Option<&mut Vec<Self>>;

    fn set_to_many(&mut self, key: &str, children: Vec<Self>);
}

/// Scalar equality that tolerates `1` vs `"1"` style mismatches
///
/// Payload ids routinely arrive as strings while stores hold numbers.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_errors_keep_first_insertion_order() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "can't be blank");
        errors.add("price", "must be positive");
        errors.add("title", "is too short");
        errors.add("title", "can't be blank");

        let keys: Vec<&str> = errors.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title", "price"]);
        assert_eq!(errors.get("title").len(), 2);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_merge_loses_nothing() {
        let mut hooks = ValidationErrors::new();
        hooks.add("title", "is reserved");
        let mut structural = ValidationErrors::new();
        structural.add("title", "can't be blank");
        structural.add("isbn", "is invalid");

        hooks.merge(structural);
        assert_eq!(hooks.get("title"), ["is reserved", "can't be blank"]);
        assert!(hooks.contains_key("isbn"));
    }

    #[test]
    fn test_loosely_equal() {
        assert!(loosely_equal(&json!(1), &json!("1")));
        assert!(loosely_equal(&json!(2.0), &json!(2)));
        assert!(!loosely_equal(&json!("a"), &json!("b")));
        assert!(loosely_equal(&Value::Null, &Value::Null));
    }
}
