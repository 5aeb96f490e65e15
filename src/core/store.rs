//! Store traits: the queryable collection and persistence capabilities
//!
//! Queries are values: every refinement consumes the query and returns a new
//! one, so a failed compilation step never leaves a half-built query behind.

use chrono::{Offset, Utc};
use serde_json::Value;

use super::entity::EntityGraph;
use super::error::StoreError;
use super::field::{ColumnType, FieldValue};
use super::metadata::AssociationInfo;
use super::operation::SortDirection;

/// A column, optionally qualified by the association path it was joined through
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Dot-separated association path from the root type (`None` = root table)
    pub path: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn root(column: impl Into<String>) -> Self {
        Self {
            path: None,
            column: column.into(),
        }
    }

    pub fn joined(path: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            column: column.into(),
        }
    }
}

/// Comparison operators a filter criterion can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}

impl FilterOperator {
    /// Parse an operator token; `<>` is an alias for `!=`
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" => Some(FilterOperator::Eq),
            "!=" | "<>" => Some(FilterOperator::NotEq),
            "<" => Some(FilterOperator::Lt),
            "<=" => Some(FilterOperator::LtEq),
            ">" => Some(FilterOperator::Gt),
            ">=" => Some(FilterOperator::GtEq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Lt => "<",
            FilterOperator::LtEq => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::GtEq => ">=",
            FilterOperator::In => "IN",
        }
    }
}

/// A store-level predicate compiled from a filter criterion
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        operator: FilterOperator,
        value: FieldValue,
    },
    In {
        column: ColumnRef,
        values: Vec<FieldValue>,
    },
}

/// A queryable collection of entities of one type
pub trait Query: Clone + Send + Sync + Sized {
    type Entity: EntityGraph;

    fn entity_type(&self) -> &str;

    /// Restrict the collection (`where`)
    fn filter(self, predicate: Predicate) -> Self;

    fn order_by(self, column: ColumnRef, direction: SortDirection) -> Self;

    /// Join an association path (dot-separated from the root type)
    fn join(self, path: &str) -> Self;

    fn is_joined(&self, path: &str) -> bool;

    /// Eager-load association paths on materialized entities
    fn include(self, paths: &[String]) -> Self;

    fn limit(self, limit: usize) -> Self;

    fn offset(self, offset: usize) -> Self;

    /// Count matching rows, ignoring limit and offset
    fn count(&self) -> Result<usize, StoreError>;

    fn first(&self) -> Result<Option<Self::Entity>, StoreError>;

    /// Materialize the collection
    fn load(&self) -> Result<Vec<Self::Entity>, StoreError>;
}

/// Association descriptor lookup
pub trait AssociationLookup {
    fn association(&self, entity_type: &str, key: &str) -> Option<AssociationInfo>;
}

/// The backing store collaborator
pub trait Store: AssociationLookup + Send + Sync {
    type Entity: EntityGraph;
    type Query: Query<Entity = Self::Entity>;

    /// The unrestricted collection of an entity type
    fn all(&self, entity_type: &str) -> Result<Self::Query, StoreError>;

    /// A new, unsaved entity of the given type
    fn instantiate(&self, entity_type: &str) -> Result<Self::Entity, StoreError>;

    /// Type of a physical column, `None` if the column does not exist
    fn column_type(&self, entity_type: &str, column: &str) -> Option<ColumnType>;

    /// Run structural validation on one entity (not its associations)
    fn validate(&self, entity: &mut Self::Entity);

    /// Persist the entity and its loaded association graph
    ///
    /// Returns `Ok(false)` when the store refused the write.
    fn save(&self, entity: &mut Self::Entity) -> Result<bool, StoreError>;

    /// Hard-delete the entity
    fn destroy(&self, entity: &mut Self::Entity) -> Result<bool, StoreError>;
}

/// Equality predicate on a root column from a raw JSON value
pub fn eq_predicate(column: &str, column_type: ColumnType, value: &Value) -> Predicate {
    let coerced = FieldValue::coerce(value, column_type, Utc.fix()).unwrap_or_else(|_| match value {
        Value::String(s) => FieldValue::String(s.clone()),
        other => FieldValue::String(other.to_string()),
    });
    Predicate::Compare {
        column: ColumnRef::root(column),
        operator: FilterOperator::Eq,
        value: coerced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_tokens() {
        assert_eq!(FilterOperator::from_token("<>"), Some(FilterOperator::NotEq));
        assert_eq!(FilterOperator::from_token(">="), Some(FilterOperator::GtEq));
        assert_eq!(FilterOperator::from_token("=>"), None);
    }

    #[test]
    fn test_eq_predicate_coerces_by_column_type() {
        let predicate = eq_predicate("id", ColumnType::Integer, &json!("7"));
        assert_eq!(
            predicate,
            Predicate::Compare {
                column: ColumnRef::root("id"),
                operator: FilterOperator::Eq,
                value: FieldValue::Integer(7),
            }
        );
    }
}
