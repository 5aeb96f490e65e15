//! Per-request context threaded through resolution, merging and rendering
//!
//! A [`RequestContext`] is built once per request and passed down by
//! reference; recursion derives modified copies (`for_operation`, `nested`)
//! rather than mutating the caller's context. The only state shared across
//! recursive calls is carried by explicit accumulators such as
//! [`IgnoredFields`], which are append-only.

use chrono::FixedOffset;
use serde_json::{Map, Value};

use super::operation::Operation;

/// Request-scoped inputs to metadata resolution
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub operation: Operation,

    /// Name of a custom action, matched by `only_actions`/`except_actions`
    pub action: Option<String>,

    /// The acting user has admin privileges
    pub admin: bool,

    /// The write is authored with admin authority
    pub admin_user: bool,

    /// The caller explicitly asked for admin-only content to be rendered
    pub admin_content: bool,

    /// The acting user's zone for temporal filter values
    pub time_zone: Option<FixedOffset>,

    /// Explicit attribute-key subset to keep
    pub only: Option<Vec<String>>,

    /// Attribute keys to drop
    pub except: Vec<String>,

    /// Association attribute keys to drop
    pub exclude_associations: Vec<String>,

    /// Fixed attribute values applied to root queries and root entities
    pub scope: Map<String, Value>,

    /// Association-path prefix of the entity currently being processed
    pub path_prefix: String,
}

impl RequestContext {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_admin_user(mut self, admin_user: bool) -> Self {
        self.admin_user = admin_user;
        self
    }

    pub fn with_admin_content(mut self, admin_content: bool) -> Self {
        self.admin_content = admin_content;
        self
    }

    pub fn with_time_zone(mut self, zone: FixedOffset) -> Self {
        self.time_zone = Some(zone);
        self
    }

    pub fn with_only<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_except<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_excluded_associations<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_associations
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_scope(mut self, key: impl Into<String>, value: Value) -> Self {
        self.scope.insert(key.into(), value);
        self
    }

    /// Same request, resolved for a different operation
    pub fn for_operation(&self, operation: Operation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    /// Context for a nested entity: caller-level key filters and scope do not
    /// carry into associations
    pub fn nested(&self, operation: Operation, prefix: impl Into<String>) -> Self {
        Self {
            operation,
            only: None,
            except: Vec::new(),
            scope: Map::new(),
            path_prefix: prefix.into(),
            ..self.clone()
        }
    }
}

/// Append-only log of payload fields that could not be applied
///
/// Rendered as an array of single-key objects, e.g. `[{"bogus": "x"}]`;
/// nested entities contribute `{"author": [...]}` or `{"items[1]": [...]}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IgnoredFields {
    entries: Vec<(String, Value)>,
}

impl IgnoredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.entries.push((key.into(), value));
    }

    /// Record a nested entity's ignored fields under `key`, if there are any
    pub fn push_nested(&mut self, key: impl Into<String>, nested: IgnoredFields) {
        if !nested.is_empty() {
            self.entries.push((key.into(), nested.to_value()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(key, value)| {
                    let mut entry = Map::new();
                    entry.insert(key.clone(), value.clone());
                    Value::Object(entry)
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_context_drops_caller_filters() {
        let ctx = RequestContext::new(Operation::Show)
            .with_admin(true)
            .with_only(["title"])
            .with_scope("user_id", json!(4));
        let nested = ctx.nested(Operation::Create, "items[0].");

        assert!(nested.admin);
        assert!(nested.only.is_none());
        assert!(nested.scope.is_empty());
        assert_eq!(nested.operation, Operation::Create);
        assert_eq!(nested.path_prefix, "items[0].");
        // caller's context is untouched
        assert_eq!(ctx.only.as_deref(), Some(&["title".to_string()][..]));
    }

    #[test]
    fn test_ignored_fields_render_as_single_key_objects() {
        let mut child = IgnoredFields::new();
        child.push("color", json!("red"));

        let mut ignored = IgnoredFields::new();
        ignored.push("bogus", json!("x"));
        ignored.push_nested("author", child);
        ignored.push_nested("items[0]", IgnoredFields::new());

        assert_eq!(ignored.len(), 2);
        assert_eq!(
            ignored.to_value(),
            json!([{"bogus": "x"}, {"author": [{"color": "red"}]}])
        );
    }
}
