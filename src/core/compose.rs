//! Query composition: filter and sort criteria onto a store query
//!
//! Criteria on physical columns compile into store predicates and orderings.
//! Dotted keys (`author.name`) join the association path once and recurse
//! into the target type. Criteria on attributes without a backing column are
//! handed back as [`ResultFilters`] / [`ResultSorts`] for the caller to apply
//! to materialized entities.

use chrono::FixedOffset;
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;

use super::context::RequestContext;
use super::entity::{EntityGraph, loosely_equal};
use super::error::QueryError;
use super::field::{ColumnType, FieldValue, compare_values};
use super::filter::{self, FilterClause, FilterParams, FilterValue, RawFilterValue};
use super::metadata::{AttributeBehavior, AttributeMetadata};
use super::operation::{Operation, SortDirection};
use super::registry::Registry;
use super::sort::SortKey;
use super::store::{ColumnRef, FilterOperator, Predicate, Query, Store, eq_predicate};

// ============================================================================
// Virtual criteria
// ============================================================================

/// A filter that could not be compiled into the store query
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualFilter {
    Criteria(Vec<FilterClause>),
    /// Criteria on an association's target, keyed by the association
    Nested(ResultFilters),
}

/// Filters to apply after materialization, keyed by attribute key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFilters {
    entries: IndexMap<String, VirtualFilter>,
}

impl ResultFilters {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&VirtualFilter> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VirtualFilter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn insert(&mut self, key: String, filter: VirtualFilter) {
        self.entries.insert(key, filter);
    }

    /// Whether a materialized entity satisfies every virtual criterion
    pub fn matches<E: EntityGraph>(
        &self,
        entity: &E,
        registry: &Registry,
        ctx: &RequestContext,
    ) -> bool {
        self.entries.iter().all(|(key, filter)| {
            let Some(attr) = registry.attribute(entity.entity_type(), key) else {
                return true;
            };
            match filter {
                VirtualFilter::Criteria(clauses) => {
                    let value = attr.read(entity, ctx);
                    clauses.iter().all(|clause| clause_matches(clause, &value))
                }
                VirtualFilter::Nested(nested) => match attr.behavior() {
                    AttributeBehavior::ToOne(_) => entity
                        .to_one(key)
                        .is_some_and(|child| nested.matches(child, registry, ctx)),
                    AttributeBehavior::ToMany(_) => entity
                        .to_many(key)
                        .iter()
                        .any(|child| nested.matches(child, registry, ctx)),
                    AttributeBehavior::Plain => true,
                },
            }
        })
    }
}

fn clause_matches(clause: &FilterClause, value: &Value) -> bool {
    match &clause.value {
        FilterValue::Set(values) => {
            let found = values.iter().any(|v| loosely_equal(value, v));
            if clause.operator == FilterOperator::NotEq {
                !found
            } else {
                found
            }
        }
        FilterValue::Scalar(expected) => {
            let ordering = if value.is_null() || expected.is_null() {
                None
            } else {
                filter_ordering(value, expected)
            };
            match clause.operator {
                FilterOperator::Eq | FilterOperator::In => loosely_equal(value, expected),
                FilterOperator::NotEq => !loosely_equal(value, expected),
                FilterOperator::Lt => ordering == Some(Ordering::Less),
                FilterOperator::LtEq => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
                FilterOperator::Gt => ordering == Some(Ordering::Greater),
                FilterOperator::GtEq => {
                    matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                }
            }
        }
    }
}

/// A sort that could not be compiled into the store query
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualSort {
    Direction(SortDirection),
    Nested(ResultSorts),
}

/// Orderings to apply after materialization, in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSorts {
    entries: IndexMap<String, VirtualSort>,
}

impl ResultSorts {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VirtualSort)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn push(&mut self, key: String, direction: SortDirection) {
        self.entries.insert(key, VirtualSort::Direction(direction));
    }

    /// Fold an association's virtual sorts in under its key
    fn push_nested(&mut self, key: &str, nested: ResultSorts) {
        if nested.is_empty() {
            return;
        }
        match self.entries.get_mut(key) {
            Some(VirtualSort::Nested(existing)) => existing.entries.extend(nested.entries),
            _ => {
                self.entries
                    .insert(key.to_string(), VirtualSort::Nested(nested));
            }
        }
    }

    /// Stable in-place sort of materialized entities
    pub fn sort<E: EntityGraph>(&self, entities: &mut [E], registry: &Registry, ctx: &RequestContext) {
        if self.is_empty() {
            return;
        }
        entities.sort_by(|a, b| self.compare(a, b, registry, ctx));
    }

    fn compare<E: EntityGraph>(
        &self,
        a: &E,
        b: &E,
        registry: &Registry,
        ctx: &RequestContext,
    ) -> Ordering {
        for (key, sort) in &self.entries {
            let Some(attr) = registry.attribute(a.entity_type(), key) else {
                continue;
            };
            let ordering = match sort {
                VirtualSort::Direction(direction) => {
                    let ordering = compare_values(&attr.read(a, ctx), &attr.read(b, ctx));
                    match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                }
                VirtualSort::Nested(nested) => {
                    match (first_related(a, attr), first_related(b, attr)) {
                        (Some(x), Some(y)) => nested.compare(x, y, registry, ctx),
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn first_related<'e, E: EntityGraph>(entity: &'e E, attr: &AttributeMetadata) -> Option<&'e E> {
    match attr.behavior() {
        AttributeBehavior::ToOne(_) => entity.to_one(&attr.key),
        AttributeBehavior::ToMany(_) => entity.to_many(&attr.key).first(),
        AttributeBehavior::Plain => None,
    }
}

/// Order a value against a filter operand: numerically when both read as
/// numbers, else as text
///
/// Only used to evaluate comparison operators, never to sort.
fn filter_ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(as_text(a).cmp(&as_text(b))),
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Composer
// ============================================================================

/// Compiles parsed criteria into a store query for one request
pub struct QueryComposer<'a, S: Store> {
    registry: &'a Registry,
    store: &'a S,
    default_zone: FixedOffset,
}

impl<'a, S: Store> QueryComposer<'a, S> {
    pub fn new(registry: &'a Registry, store: &'a S, default_zone: FixedOffset) -> Self {
        Self {
            registry,
            store,
            default_zone,
        }
    }

    /// The collection a request may see
    ///
    /// Soft-deleted rows are excluded and the request scope applied as
    /// equality filters.
    pub fn base_query(
        &self,
        entity_type: &str,
        ctx: &RequestContext,
    ) -> Result<S::Query, QueryError> {
        let model = self.registry.model(entity_type)?;
        let mut query = self.store.all(entity_type)?;

        if let Some(column) = &model.soft_delete {
            let live = match self.store.column_type(entity_type, column) {
                Some(ColumnType::Boolean) => Some(FieldValue::Boolean(false)),
                Some(ColumnType::Integer | ColumnType::Decimal) => Some(FieldValue::Integer(0)),
                _ => None,
            };
            match live {
                Some(value) => {
                    query = query.filter(Predicate::Compare {
                        column: ColumnRef::root(column.clone()),
                        operator: FilterOperator::Eq,
                        value,
                    });
                }
                None => {
                    tracing::warn!(entity_type, column = %column, "soft-delete column has no usable type");
                }
            }
        }

        for (key, value) in &ctx.scope {
            let column_type = self
                .store
                .column_type(entity_type, key)
                .unwrap_or(ColumnType::Other);
            query = query.filter(eq_predicate(key, column_type, value));
        }
        Ok(query)
    }

    /// Apply filter parameters, returning the refined query and any
    /// criteria left for post-processing
    pub fn apply_filters(
        &self,
        query: S::Query,
        entity_type: &str,
        params: &FilterParams,
        ctx: &RequestContext,
    ) -> Result<(S::Query, ResultFilters), QueryError> {
        let entries = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.filter_level(query, entity_type, None, entries, ctx)
    }

    fn filter_level(
        &self,
        mut query: S::Query,
        entity_type: &str,
        path: Option<&str>,
        entries: Vec<(String, RawFilterValue)>,
        ctx: &RequestContext,
    ) -> Result<(S::Query, ResultFilters), QueryError> {
        let filter_ctx = ctx.for_operation(Operation::Filter);
        let resolved = self
            .registry
            .resolve(entity_type, Operation::Filter, &filter_ctx)?;
        let zone = ctx.time_zone.unwrap_or(self.default_zone);
        let mut results = ResultFilters::default();
        let mut nested: IndexMap<String, Vec<(String, RawFilterValue)>> = IndexMap::new();

        for (key, raw) in entries {
            if let Some((head, rest)) = key.split_once('.') {
                match resolved.by_query(head.trim()) {
                    Some(attr) if attr.association_info().is_some() => {
                        nested
                            .entry(attr.key.clone())
                            .or_default()
                            .push((rest.to_string(), raw));
                    }
                    _ => tracing::debug!(key = %key, "dropping filter on unknown association"),
                }
                continue;
            }

            let Some(attr) = resolved.by_query(key.trim()) else {
                tracing::debug!(key = %key, "dropping filter on unknown attribute");
                continue;
            };
            let clauses = filter::parse(&raw, attr, &filter_ctx);
            if let Some(info) = attr.association_info() {
                // `author=3` filters on the key this side holds
                let foreign_key = info
                    .owns_foreign_key
                    .then(|| self.store.column_type(entity_type, &info.foreign_key))
                    .flatten();
                match foreign_key {
                    Some(column_type) => {
                        let column = column_at(path, info.foreign_key.clone());
                        for clause in clauses {
                            let predicate =
                                compile_clause(column.clone(), column_type, clause, &attr.key, zone)?;
                            query = query.filter(predicate);
                        }
                    }
                    None => tracing::debug!(key = %key, "dropping filter on association without a key path"),
                }
                continue;
            }
            match self.column_for(entity_type, attr) {
                Some((column, column_type)) => {
                    let column = column_at(path, column);
                    for clause in clauses {
                        let predicate =
                            compile_clause(column.clone(), column_type, clause, &attr.key, zone)?;
                        query = query.filter(predicate);
                    }
                }
                None => results.insert(attr.key.clone(), VirtualFilter::Criteria(clauses)),
            }
        }

        for (assoc_key, entries) in nested {
            let Some(info) = resolved.get(&assoc_key).and_then(|a| a.association_info()) else {
                continue;
            };
            let join_path = qualify(path, &assoc_key);
            if !query.is_joined(&join_path) {
                query = query.join(&join_path);
            }
            let nested_ctx = ctx.nested(Operation::Filter, "");
            let (refined, nested_results) =
                self.filter_level(query, &info.target_type, Some(&join_path), entries, &nested_ctx)?;
            query = refined;
            if !nested_results.is_empty() {
                results.insert(assoc_key, VirtualFilter::Nested(nested_results));
            }
        }
        Ok((query, results))
    }

    /// Apply sort keys in request order
    pub fn apply_sorts(
        &self,
        mut query: S::Query,
        entity_type: &str,
        keys: &[SortKey],
        ctx: &RequestContext,
    ) -> Result<(S::Query, ResultSorts), QueryError> {
        let mut results = ResultSorts::default();
        let mut keys: Vec<&SortKey> = keys.iter().collect();
        keys.sort_by_key(|k| k.position);
        for key in keys {
            query = self.sort_one(query, entity_type, None, &key.key, key, ctx, &mut results)?;
        }
        Ok((query, results))
    }

    #[allow(clippy::too_many_arguments)]
    fn sort_one(
        &self,
        mut query: S::Query,
        entity_type: &str,
        path: Option<&str>,
        name: &str,
        key: &SortKey,
        ctx: &RequestContext,
        results: &mut ResultSorts,
    ) -> Result<S::Query, QueryError> {
        let sort_ctx = ctx.for_operation(Operation::Sort);
        let resolved = self
            .registry
            .resolve(entity_type, Operation::Sort, &sort_ctx)?;

        if let Some((head, rest)) = name.split_once('.') {
            let Some(attr) = resolved.by_query(head.trim()) else {
                return Ok(query);
            };
            let Some(info) = attr.association_info() else {
                return Ok(query);
            };
            let join_path = qualify(path, &attr.key);
            if !query.is_joined(&join_path) {
                query = query.join(&join_path);
            }
            let nested_ctx = ctx.nested(Operation::Sort, "");
            let mut nested = ResultSorts::default();
            query = self.sort_one(
                query,
                &info.target_type,
                Some(&join_path),
                rest,
                key,
                &nested_ctx,
                &mut nested,
            )?;
            results.push_nested(&attr.key, nested);
            return Ok(query);
        }

        let Some(attr) = resolved.by_query(name.trim()) else {
            tracing::debug!(key = %name, "dropping sort on unsortable attribute");
            return Ok(query);
        };
        let direction = key.direction.resolve(attr.default_sort);
        match self.column_for(entity_type, attr) {
            Some((column, _)) => Ok(query.order_by(column_at(path, column), direction)),
            None => {
                results.push(attr.key.clone(), direction);
                Ok(query)
            }
        }
    }

    /// Physical column backing an attribute: its key, else its render method
    fn column_for(&self, entity_type: &str, attr: &AttributeMetadata) -> Option<(String, ColumnType)> {
        if attr.value.is_some() {
            return None;
        }
        if let Some(column_type) = self.store.column_type(entity_type, &attr.key) {
            return Some((attr.key.clone(), column_type));
        }
        let method = attr.render_method.as_ref()?;
        self.store
            .column_type(entity_type, method)
            .map(|column_type| (method.clone(), column_type))
    }
}

fn column_at(path: Option<&str>, column: String) -> ColumnRef {
    match path {
        Some(path) => ColumnRef::joined(path, column),
        None => ColumnRef::root(column),
    }
}

fn qualify(path: Option<&str>, key: &str) -> String {
    match path {
        Some(path) => format!("{}.{}", path, key),
        None => key.to_string(),
    }
}

fn coerce(
    value: &Value,
    column_type: ColumnType,
    attribute: &str,
    zone: FixedOffset,
) -> Result<FieldValue, QueryError> {
    FieldValue::coerce(value, column_type, zone).map_err(|reason| QueryError::InvalidFilterValue {
        attribute: attribute.to_string(),
        value: as_text(value),
        reason,
    })
}

fn compile_clause(
    column: ColumnRef,
    column_type: ColumnType,
    clause: FilterClause,
    attribute: &str,
    zone: FixedOffset,
) -> Result<Predicate, QueryError> {
    match clause.value {
        FilterValue::Set(values) => {
            let values = values
                .iter()
                .map(|v| coerce(v, column_type, attribute, zone))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Predicate::In { column, values })
        }
        FilterValue::Scalar(value) => Ok(Predicate::Compare {
            column,
            operator: clause.operator,
            value: coerce(&value, column_type, attribute, zone)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_ordering_reads_numeric_text() {
        assert_eq!(filter_ordering(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert_eq!(filter_ordering(&json!("abc"), &json!("abd")), Some(Ordering::Less));
        assert_eq!(filter_ordering(&json!("NaN"), &json!(1)), None);
    }

    #[test]
    fn test_clause_matching() {
        let set = FilterClause::set(vec![json!("a"), json!("b")]);
        assert!(clause_matches(&set, &json!("b")));
        assert!(!clause_matches(&set, &json!("c")));

        let at_least = FilterClause::scalar(FilterOperator::GtEq, "5");
        assert!(clause_matches(&at_least, &json!(5)));
        assert!(clause_matches(&at_least, &json!(7.5)));
        assert!(!clause_matches(&at_least, &json!(4)));
        assert!(!clause_matches(&at_least, &Value::Null));

        let not = FilterClause::scalar(FilterOperator::NotEq, "1");
        assert!(clause_matches(&not, &json!(2)));
        assert!(!clause_matches(&not, &json!(1)));
    }

    #[test]
    fn test_compile_clause_coerces_by_column_type() {
        let zone = FixedOffset::west_opt(5 * 3600).unwrap();
        let predicate = compile_clause(
            ColumnRef::root("price"),
            ColumnType::Decimal,
            FilterClause::scalar(FilterOperator::Lt, "12.5"),
            "price",
            zone,
        )
        .unwrap();
        assert_eq!(
            predicate,
            Predicate::Compare {
                column: ColumnRef::root("price"),
                operator: FilterOperator::Lt,
                value: FieldValue::Float(12.5),
            }
        );

        let membership = compile_clause(
            ColumnRef::joined("author", "id"),
            ColumnType::Integer,
            FilterClause::set(vec![json!("1"), json!("2")]),
            "id",
            zone,
        )
        .unwrap();
        assert!(matches!(membership, Predicate::In { values, .. } if values.len() == 2));

        let bad = compile_clause(
            ColumnRef::root("published_at"),
            ColumnType::Date,
            FilterClause::scalar(FilterOperator::Gt, "someday"),
            "published_at",
            zone,
        );
        assert!(matches!(bad, Err(QueryError::InvalidFilterValue { .. })));
    }
}
