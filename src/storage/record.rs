//! Dynamic record type used by the in-memory store

use chrono::{FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::schema::TableSchema;
use crate::core::entity::{Entity, EntityGraph, ValidationErrors};
use crate::core::error::AttributeError;
use crate::core::field::{ColumnType, parse_bool, parse_datetime};

/// One row plus its loaded associations
#[derive(Debug, Clone)]
pub struct Record {
    table: Arc<TableSchema>,
    values: IndexMap<String, Value>,
    to_one: IndexMap<String, Option<Box<Record>>>,
    to_many: IndexMap<String, Vec<Record>>,
    errors: ValidationErrors,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &str, found: &Value) -> AttributeError {
    AttributeError::TypeMismatch {
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    }
}

/// Coerce a written value to the column's type
pub fn coerce_column(column_type: ColumnType, value: Value) -> Result<Value, AttributeError> {
    if value.is_null() {
        return Ok(value);
    }
    match column_type {
        ColumnType::Integer => match &value {
            Value::Number(n) if n.as_i64().is_some() => Ok(value),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
                _ => Err(mismatch("integer", &value)),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch("integer", &value)),
            _ => Err(mismatch("integer", &value)),
        },
        ColumnType::Decimal => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch("decimal", &value)),
            _ => Err(mismatch("decimal", &value)),
        },
        ColumnType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => parse_bool(s)
                .map(Value::Bool)
                .ok_or_else(|| mismatch("boolean", &value)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch("boolean", &value)),
            },
            _ => Err(mismatch("boolean", &value)),
        },
        ColumnType::Date => {
            let utc = FixedOffset::east_opt(0).ok_or_else(|| mismatch("date", &value))?;
            match &value {
                Value::String(s) => parse_datetime(s, utc)
                    .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
                    .ok_or_else(|| mismatch("date", &value)),
                _ => Err(mismatch("date", &value)),
            }
        }
        ColumnType::Other => Ok(value),
    }
}

impl Record {
    /// A new, unsaved record with column defaults
    pub fn new(table: Arc<TableSchema>) -> Self {
        let values = table.default_row();
        Self::from_row(table, values)
    }

    pub fn from_row(table: Arc<TableSchema>, values: IndexMap<String, Value>) -> Self {
        Self {
            table,
            values,
            to_one: IndexMap::new(),
            to_many: IndexMap::new(),
            errors: ValidationErrors::new(),
        }
    }

    pub fn table(&self) -> &Arc<TableSchema> {
        &self.table
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Column values as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    pub fn id(&self) -> Option<i64> {
        self.values.get(TableSchema::PRIMARY_KEY)?.as_i64()
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.values
            .insert(TableSchema::PRIMARY_KEY.to_string(), Value::from(id));
    }

    /// Store-internal write that skips coercion
    pub(crate) fn put(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
    }

    pub fn is_loaded(&self, association: &str) -> bool {
        self.to_one.contains_key(association) || self.to_many.contains_key(association)
    }

    /// Attach loaded associations without touching key columns
    pub(crate) fn attach_one(&mut self, association: &str, child: Option<Record>) {
        self.to_one
            .insert(association.to_string(), child.map(Box::new));
    }

    pub(crate) fn attach_many(&mut self, association: &str, children: Vec<Record>) {
        self.to_many.insert(association.to_string(), children);
    }

    pub(crate) fn loaded_to_one_mut(&mut self) -> impl Iterator<Item = (&String, &mut Box<Record>)> {
        self.to_one
            .iter_mut()
            .filter_map(|(k, v)| v.as_mut().map(|child| (k, child)))
    }

    pub(crate) fn loaded_to_many_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vec<Record>)> {
        self.to_many.iter_mut()
    }
}

impl Entity for Record {
    fn entity_type(&self) -> &str {
        &self.table.entity_type
    }

    fn primary_key(&self) -> Option<Value> {
        self.id().map(Value::from)
    }

    fn field(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn has_field(&self, key: &str) -> bool {
        self.table.columns.contains_key(key)
    }

    fn set_field(&mut self, key: &str, value: Value) -> Result<(), AttributeError> {
        let column = self
            .table
            .column_def(key)
            .ok_or_else(|| AttributeError::NoSuchField(key.to_string()))?;
        let value = coerce_column(column.column_type, value)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }
}

impl EntityGraph for Record {
    fn to_one(&self, key: &str) -> Option<&Self> {
        self.to_one.get(key)?.as_deref()
    }

    fn to_one_mut(&mut self, key: &str) -> Option<&mut Self> {
        self.to_one.get_mut(key)?.as_deref_mut()
    }

    /// Assigning a persisted child also updates the key column this side holds
    fn set_to_one(&mut self, key: &str, child: Option<Self>) {
        if let Some(info) = self.table.associations.get(key) {
            if info.owns_foreign_key {
                let fk = child
                    .as_ref()
                    .and_then(Record::id)
                    .map(Value::from)
                    .unwrap_or(Value::Null);
                if child.as_ref().is_none_or(|c| c.id().is_some()) {
                    self.values.insert(info.foreign_key.clone(), fk);
                }
            }
        }
        self.to_one.insert(key.to_string(), child.map(Box::new));
    }

    fn to_many(&self, key: &str) -> &[Self] {
        self.to_many.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn to_many_mut(&mut self, key: &str) -> Option<&mut Vec<Self>> {
        if !self.table.associations.contains_key(key) {
            return None;
        }
        Some(self.to_many.entry(key.to_string()).or_default())
    }

    fn set_to_many(&mut self, key: &str, children: Vec<Self>) {
        self.to_many.insert(key.to_string(), children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::AssociationInfo;
    use crate::storage::schema::ColumnDef;
    use serde_json::json;

    fn book_table() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new("book")
                .column(ColumnDef::new("title", ColumnType::Other))
                .column(ColumnDef::new("price", ColumnType::Decimal))
                .column(ColumnDef::new("in_print", ColumnType::Boolean))
                .column(ColumnDef::new("published_at", ColumnType::Date))
                .association("author", AssociationInfo::belongs_to("author", "author_id")),
        )
    }

    fn author_table() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::new("author")
                .association("books", AssociationInfo::has_many("book", "author_id")),
        )
    }

    #[test]
    fn test_set_field_coerces_by_column_type() {
        let mut book = Record::new(book_table());
        book.set_field("price", json!("12.50")).unwrap();
        book.set_field("in_print", json!("yes")).unwrap();
        book.set_field("published_at", json!("2024-03-01")).unwrap();
        assert_eq!(book.field("price"), Some(json!(12.5)));
        assert_eq!(book.field("in_print"), Some(json!(true)));
        assert_eq!(book.field("published_at"), Some(json!("2024-03-01T00:00:00Z")));
    }

    #[test]
    fn test_set_field_errors() {
        let mut book = Record::new(book_table());
        let err = book.set_field("price", json!("cheap")).unwrap_err();
        assert!(matches!(err, AttributeError::TypeMismatch { .. }));
        let err = book.set_field("bogus", json!(1)).unwrap_err();
        assert!(matches!(err, AttributeError::NoSuchField(_)));
    }

    #[test]
    fn test_new_record_is_new() {
        let mut book = Record::new(book_table());
        assert!(book.is_new());
        book.set_id(4);
        assert_eq!(book.primary_key(), Some(json!(4)));
    }

    #[test]
    fn test_set_to_one_updates_owned_key() {
        let mut author = Record::new(author_table());
        author.set_id(9);
        let mut book = Record::new(book_table());
        book.set_to_one("author", Some(author));
        assert_eq!(book.field("author_id"), Some(json!(9)));
        assert_eq!(book.to_one("author").and_then(Record::id), Some(9));

        book.set_to_one("author", None);
        assert_eq!(book.field("author_id"), Some(Value::Null));
    }

    #[test]
    fn test_to_many_access() {
        let mut author = Record::new(author_table());
        assert!(author.to_many("books").is_empty());
        assert!(author.to_many_mut("bogus").is_none());
        author
            .to_many_mut("books")
            .unwrap()
            .push(Record::new(book_table()));
        assert_eq!(author.to_many("books").len(), 1);
        assert!(author.is_loaded("books"));
    }
}
