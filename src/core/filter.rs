//! Filter expression parsing
//!
//! A raw query-string value becomes an ordered list of `(operator, value)`
//! clauses. Accepted shapes:
//!
//! - `>=5` / `<>x` / `abc`: one clause; a missing operator means `=`
//! - `a,b,>=5`: delimiter-separated list (per-attribute delimiter, default `,`)
//! - `["a","b"]`: a JSON array literal
//! - `name[0]=a&name[1]=b`: an indexed map, equivalent to an array
//!
//! In list form every `=` element is collected into one trailing
//! `(=, [..])` clause so membership compiles to a single predicate.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::context::RequestContext;
use super::metadata::AttributeMetadata;
use super::store::FilterOperator;

/// A filter value as it arrived in the request
#[derive(Debug, Clone, PartialEq)]
pub enum RawFilterValue {
    Text(String),
    /// `key[]=a&key[]=b`
    List(Vec<Value>),
    /// `key[0]=a&key[1]=b`, in arrival order
    Indexed(Vec<(String, Value)>),
}

/// Right-hand side of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Value),
    Set(Vec<Value>),
}

/// One `(operator, value)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl FilterClause {
    pub fn scalar(operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            value: FilterValue::Scalar(value.into()),
        }
    }

    pub fn set(values: Vec<Value>) -> Self {
        Self {
            operator: FilterOperator::Eq,
            value: FilterValue::Set(values),
        }
    }
}

/// Ordered filter parameters keyed by (possibly dotted) query name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParams {
    entries: Vec<(String, RawFilterValue)>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: RawFilterValue) {
        self.entries.push((key.into(), value));
    }

    pub fn with(mut self, key: impl Into<String>, value: &str) -> Self {
        self.push(key, RawFilterValue::Text(value.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawFilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Collect filters from decoded query-string pairs
    ///
    /// Keys in `reserved` are skipped. Bracketed keys (`k[]`, `k[0]`) are
    /// grouped into list or indexed values. A key ending in `>`, `<`, `!` or
    /// `=` is what `price>=10` decodes to, so that character moves back into
    /// the value (`price`, `>=10`).
    pub fn from_query_pairs<I>(pairs: I, reserved: &[String]) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut grouped: IndexMap<String, RawFilterValue> = IndexMap::new();
        for (key, value) in pairs {
            if reserved.iter().any(|r| r == &key) {
                continue;
            }
            if let Some((base, index)) = bracket_index(&key) {
                let entry = grouped.entry(base.to_string()).or_insert_with(|| {
                    if index.is_empty() {
                        RawFilterValue::List(Vec::new())
                    } else {
                        RawFilterValue::Indexed(Vec::new())
                    }
                });
                match entry {
                    RawFilterValue::List(items) => items.push(Value::String(value)),
                    RawFilterValue::Indexed(items) => {
                        items.push((index.to_string(), Value::String(value)))
                    }
                    RawFilterValue::Text(_) => {}
                }
                continue;
            }

            let last = key.chars().last();
            let (key, value) = match last {
                Some(c @ ('>' | '<' | '!' | '=')) if key.len() > 1 => {
                    (key[..key.len() - 1].to_string(), format!("{}={}", c, value))
                }
                _ => (key, value),
            };
            grouped.insert(key, RawFilterValue::Text(value));
        }
        Self {
            entries: grouped.into_iter().collect(),
        }
    }
}

/// Split `name[3]` into (`name`, `3`) and `name[]` into (`name`, ``)
fn bracket_index(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.contains('[') || inner.contains(']') {
        return None;
    }
    Some((&key[..open], inner))
}

fn operator_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^(>=|<=|!=|<>)\s*(\S.*)$").expect("valid operator regex"),
            Regex::new(r"^(>|<|=)\s*([^\s<>=!].*)$").expect("valid operator regex"),
        ]
    })
}

/// Split a leading comparison operator from a single value
pub fn parse_operator(text: &str) -> (FilterOperator, String) {
    let text = text.trim();
    for pattern in operator_patterns() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        if let Some(operator) = caps.get(1).and_then(|m| FilterOperator::from_token(m.as_str())) {
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            return (operator, rest.to_string());
        }
    }
    (FilterOperator::Eq, text.to_string())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run the attribute's parse transform, keeping the raw value on failure
fn transform_value(attr: &AttributeMetadata, value: Value, ctx: &RequestContext) -> Value {
    match &attr.parse {
        Some(transform) => match transform(value.clone(), ctx) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(attribute = %attr.key, error = %e, "filter value transform failed, using raw value");
                value
            }
        },
        None => value,
    }
}

/// Parse one raw filter value against an attribute's metadata
pub fn parse(
    raw: &RawFilterValue,
    attr: &AttributeMetadata,
    ctx: &RequestContext,
) -> Vec<FilterClause> {
    match raw {
        RawFilterValue::List(items) => parse_list(items.iter().map(value_text), attr, ctx),
        RawFilterValue::Indexed(items) => {
            let mut items: Vec<&(String, Value)> = items.iter().collect();
            items.sort_by_key(|(index, _)| index.parse::<usize>().unwrap_or(usize::MAX));
            parse_list(items.into_iter().map(|(_, v)| value_text(v)), attr, ctx)
        }
        RawFilterValue::Text(text) => {
            let text = text.trim();
            if text.starts_with('[') && text.ends_with(']') {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(text) {
                    return parse_list(items.iter().map(value_text), attr, ctx);
                }
            }
            let delimiter = attr.delimiter_or_default();
            if !delimiter.is_empty() && text.contains(delimiter) {
                let parts: Vec<String> = text.split(delimiter).map(str::to_string).collect();
                return parse_list(parts.into_iter(), attr, ctx);
            }
            let (operator, value) = parse_operator(text);
            vec![FilterClause::scalar(
                operator,
                transform_value(attr, Value::String(value), ctx),
            )]
        }
    }
}

fn parse_list(
    items: impl Iterator<Item = String>,
    attr: &AttributeMetadata,
    ctx: &RequestContext,
) -> Vec<FilterClause> {
    let mut clauses = Vec::new();
    let mut equals: Vec<Value> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (operator, value) = parse_operator(item);
        let value = transform_value(attr, Value::String(value), ctx);
        if operator == FilterOperator::Eq {
            if !equals.contains(&value) {
                equals.push(value);
            }
        } else {
            clauses.push(FilterClause::scalar(operator, value));
        }
    }
    if !equals.is_empty() {
        clauses.push(FilterClause::set(equals));
    }
    clauses
}
