//! In-memory store for testing and development
//!
//! Rows live in per-table ordered maps behind a `RwLock`. Queries are plain
//! values that collect predicates, joins and orderings and are evaluated
//! against a snapshot of the rows when counted or loaded.

use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::record::Record;
use super::schema::{Schema, TableSchema};
use crate::core::entity::{Entity, EntityGraph, loosely_equal};
use crate::core::error::StoreError;
use crate::core::field::{ColumnType, FieldValue};
use crate::core::metadata::{AssociationInfo, Cardinality};
use crate::core::operation::SortDirection;
use crate::core::store::{AssociationLookup, ColumnRef, FilterOperator, Predicate, Query, Store};

type Row = IndexMap<String, Value>;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, BTreeMap<i64, Row>>,
    next_id: HashMap<String, i64>,
}

impl Tables {
    fn rows(&self, entity_type: &str) -> impl Iterator<Item = (&i64, &Row)> {
        self.rows.get(entity_type).into_iter().flat_map(|t| t.iter())
    }

    fn allocate_id(&mut self, entity_type: &str) -> i64 {
        let next = self.next_id.entry(entity_type.to_string()).or_insert(0);
        *next += 1;
        *next
    }

    fn reserve_id(&mut self, entity_type: &str, id: i64) {
        let next = self.next_id.entry(entity_type.to_string()).or_insert(0);
        *next = (*next).max(id);
    }
}

/// Thread-safe in-memory implementation of [`Store`]
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    schema: Arc<Schema>,
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn table(&self, entity_type: &str) -> Result<&Arc<TableSchema>, StoreError> {
        self.schema
            .get(entity_type)
            .ok_or_else(|| StoreError::UnknownTable(entity_type.to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Unavailable(format!("failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Unavailable(format!("failed to acquire write lock: {}", e)))
    }

    /// Insert a row from a JSON object, bypassing validation
    pub fn insert(&self, entity_type: &str, values: Value) -> Result<Record, StoreError> {
        let mut record = Record::new(self.table(entity_type)?.clone());
        if let Value::Object(map) = values {
            for (key, value) in map {
                if key == TableSchema::PRIMARY_KEY {
                    if let Some(id) = value.as_i64() {
                        record.set_id(id);
                    }
                    continue;
                }
                record
                    .set_field(&key, value)
                    .map_err(|e| StoreError::Failed(format!("{}.{}: {}", entity_type, key, e)))?;
            }
        }
        let mut tables = self.write()?;
        self.save_node(&mut tables, &mut record, &mut HashSet::new())?;
        Ok(record)
    }

    /// Fetch one row by id, without associations
    pub fn find(&self, entity_type: &str, id: i64) -> Result<Option<Record>, StoreError> {
        let table = self.table(entity_type)?;
        let tables = self.read()?;
        Ok(tables
            .rows
            .get(entity_type)
            .and_then(|rows| rows.get(&id))
            .map(|row| Record::from_row(table.clone(), row.clone())))
    }

    /// Number of stored rows of a type
    pub fn len(&self, entity_type: &str) -> Result<usize, StoreError> {
        Ok(self.read()?.rows(entity_type).count())
    }

    pub fn is_empty(&self, entity_type: &str) -> Result<bool, StoreError> {
        Ok(self.len(entity_type)? == 0)
    }

    // === Association traversal ===

    /// Rows related to `row` through one association
    fn related<'t>(
        &self,
        tables: &'t Tables,
        table: &TableSchema,
        row: &Row,
        key: &str,
    ) -> Option<(Arc<TableSchema>, Vec<&'t Row>)> {
        let info = table.associations.get(key)?;
        let target = self.schema.get(&info.target_type)?.clone();
        let rows = if info.owns_foreign_key {
            match row.get(&info.foreign_key) {
                Some(fk) if !fk.is_null() => tables
                    .rows(&info.target_type)
                    .filter(|(_, r)| {
                        r.get(TableSchema::PRIMARY_KEY)
                            .is_some_and(|id| loosely_equal(id, fk))
                    })
                    .map(|(_, r)| r)
                    .collect(),
                _ => Vec::new(),
            }
        } else {
            match row.get(TableSchema::PRIMARY_KEY) {
                Some(id) if !id.is_null() => tables
                    .rows(&info.target_type)
                    .filter(|(_, r)| r.get(&info.foreign_key).is_some_and(|fk| loosely_equal(fk, id)))
                    .map(|(_, r)| r)
                    .collect(),
                _ => Vec::new(),
            }
        };
        Some((target, rows))
    }

    /// Rows reached by walking a dotted association path
    fn walk<'t>(&self, tables: &'t Tables, table: &Arc<TableSchema>, row: &'t Row, path: &str) -> Vec<&'t Row> {
        let mut current: Vec<(Arc<TableSchema>, &'t Row)> = vec![(table.clone(), row)];
        for segment in path.split('.') {
            let mut next = Vec::new();
            for (table, row) in &current {
                if let Some((target, rows)) = self.related(tables, table, row, segment) {
                    next.extend(rows.into_iter().map(|r| (target.clone(), r)));
                }
            }
            current = next;
        }
        current.into_iter().map(|(_, r)| r).collect()
    }

    /// Attach eager-loaded association paths to a record
    fn attach(&self, tables: &Tables, record: &mut Record, paths: &[String]) {
        let mut grouped: IndexMap<&str, Vec<String>> = IndexMap::new();
        for path in paths {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest.to_string())),
                None => (path.as_str(), None),
            };
            let entry = grouped.entry(head).or_default();
            entry.extend(rest);
        }

        let table = record.table().clone();
        for (key, rest) in grouped {
            let Some(info) = table.associations.get(key) else {
                continue;
            };
            let Some((target, rows)) = self.related(tables, &table, record.values(), key) else {
                continue;
            };
            let mut children: Vec<Record> = rows
                .into_iter()
                .map(|row| Record::from_row(target.clone(), row.clone()))
                .collect();
            for child in children.iter_mut() {
                self.attach(tables, child, &rest);
            }
            match info.cardinality {
                Cardinality::ToOne => record.attach_one(key, children.into_iter().next()),
                Cardinality::ToMany => record.attach_many(key, children),
            }
        }
    }

    // === Persistence ===

    /// Persist a record graph: owned to-one targets, the row, then children
    fn save_node(
        &self,
        tables: &mut Tables,
        record: &mut Record,
        visited: &mut HashSet<(String, i64)>,
    ) -> Result<(), StoreError> {
        let table = record.table().clone();
        let entity_type = table.entity_type.clone();
        if let Some(id) = record.id() {
            if !visited.insert((entity_type.clone(), id)) {
                return Ok(());
            }
        }

        let mut owned_keys = Vec::new();
        for (key, child) in record.loaded_to_one_mut() {
            let Some(info) = table.associations.get(key) else {
                continue;
            };
            if info.owns_foreign_key {
                self.save_node(tables, child, visited)?;
                owned_keys.push((info.foreign_key.clone(), child.id()));
            }
        }
        for (column, id) in owned_keys {
            record.put(&column, id.map(Value::from).unwrap_or(Value::Null));
        }

        let id = match record.id() {
            Some(id) => {
                tables.reserve_id(&entity_type, id);
                id
            }
            None => {
                let id = tables.allocate_id(&entity_type);
                record.set_id(id);
                visited.insert((entity_type.clone(), id));
                id
            }
        };
        let row: Row = table
            .columns
            .keys()
            .map(|c| (c.clone(), record.values().get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        tables.rows.entry(entity_type.clone()).or_default().insert(id, row);
        tracing::debug!(entity_type = %entity_type, id, "row saved");

        for (key, child) in record.loaded_to_one_mut() {
            let Some(info) = table.associations.get(key) else {
                continue;
            };
            if !info.owns_foreign_key {
                child.put(&info.foreign_key, Value::from(id));
                self.save_node(tables, child, visited)?;
            }
        }

        let mut kept: Vec<(AssociationInfo, Vec<i64>)> = Vec::new();
        for (key, children) in record.loaded_to_many_mut() {
            let Some(info) = table.associations.get(key) else {
                continue;
            };
            let mut ids = Vec::new();
            for child in children.iter_mut() {
                child.put(&info.foreign_key, Value::from(id));
                self.save_node(tables, child, visited)?;
                ids.extend(child.id());
            }
            kept.push((info.clone(), ids));
        }

        // Children dropped from a loaded collection are detached
        for (info, ids) in kept {
            if let Some(rows) = tables.rows.get_mut(&info.target_type) {
                for (child_id, row) in rows.iter_mut() {
                    let points_here = row
                        .get(&info.foreign_key)
                        .is_some_and(|fk| fk.as_i64() == Some(id));
                    if points_here && !ids.contains(child_id) {
                        row.insert(info.foreign_key.clone(), Value::Null);
                    }
                }
            }
        }
        Ok(())
    }

    fn unique_taken(&self, tables: &Tables, record: &Record, column: &str, value: &Value) -> bool {
        let own_id = record.id();
        tables.rows(record.entity_type()).any(|(id, row)| {
            Some(*id) != own_id && row.get(column).is_some_and(|other| loosely_equal(other, value))
        })
    }
}

impl AssociationLookup for InMemoryStore {
    fn association(&self, entity_type: &str, key: &str) -> Option<AssociationInfo> {
        self.schema.get(entity_type)?.associations.get(key).cloned()
    }
}

impl Store for InMemoryStore {
    type Entity = Record;
    type Query = MemoryQuery;

    fn all(&self, entity_type: &str) -> Result<MemoryQuery, StoreError> {
        self.table(entity_type)?;
        Ok(MemoryQuery {
            store: self.clone(),
            entity_type: entity_type.to_string(),
            predicates: Vec::new(),
            orders: Vec::new(),
            joins: Vec::new(),
            includes: Vec::new(),
            limit: None,
            offset: 0,
        })
    }

    fn instantiate(&self, entity_type: &str) -> Result<Record, StoreError> {
        Ok(Record::new(self.table(entity_type)?.clone()))
    }

    fn column_type(&self, entity_type: &str, column: &str) -> Option<ColumnType> {
        self.schema
            .get(entity_type)?
            .column_def(column)
            .map(|c| c.column_type)
    }

    /// Required columns, column validators and uniqueness
    fn validate(&self, entity: &mut Record) {
        let table = entity.table().clone();
        let tables = match self.read() {
            Ok(tables) => tables,
            Err(e) => {
                entity.add_error("base", &e.to_string());
                return;
            }
        };

        let pending_keys: Vec<&str> = table
            .associations
            .iter()
            .filter(|(key, info)| info.owns_foreign_key && entity.to_one(key).is_some())
            .map(|(_, info)| info.foreign_key.as_str())
            .collect();

        for column in table.columns.values() {
            if column.name == TableSchema::PRIMARY_KEY {
                continue;
            }
            let value = entity.field(&column.name).unwrap_or(Value::Null);
            let blank = value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty());
            if blank {
                if column.required && !pending_keys.contains(&column.name.as_str()) {
                    entity.add_error(&column.name, "can't be blank");
                }
                continue;
            }
            for validator in &column.validators {
                if let Err(message) = validator(&value) {
                    entity.add_error(&column.name, &message);
                }
            }
            if column.unique && self.unique_taken(&tables, entity, &column.name, &value) {
                entity.add_error(&column.name, "has already been taken");
            }
        }
    }

    fn save(&self, entity: &mut Record) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        self.save_node(&mut tables, entity, &mut HashSet::new())?;
        Ok(true)
    }

    fn destroy(&self, entity: &mut Record) -> Result<bool, StoreError> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        let table = entity.table().clone();
        let mut tables = self.write()?;
        let removed = tables
            .rows
            .get_mut(&table.entity_type)
            .and_then(|rows| rows.remove(&id))
            .is_some();
        if !removed {
            return Ok(false);
        }

        for info in table.associations.values().filter(|i| !i.owns_foreign_key) {
            if let Some(rows) = tables.rows.get_mut(&info.target_type) {
                for row in rows.values_mut() {
                    if row.get(&info.foreign_key).is_some_and(|fk| fk.as_i64() == Some(id)) {
                        row.insert(info.foreign_key.clone(), Value::Null);
                    }
                }
            }
        }
        tracing::debug!(entity_type = %table.entity_type, id, "row destroyed");
        Ok(true)
    }
}

// ============================================================================
// Query
// ============================================================================

/// A query over one table of an [`InMemoryStore`]
///
/// Predicates on a joined path match when some related row satisfies every
/// predicate on that path.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    store: InMemoryStore,
    entity_type: String,
    predicates: Vec<Predicate>,
    orders: Vec<(ColumnRef, SortDirection)>,
    joins: Vec<String>,
    includes: Vec<String>,
    limit: Option<usize>,
    offset: usize,
}

fn compare_matches(operator: FilterOperator, value: &FieldValue, stored: &Value) -> bool {
    if value.is_null() {
        return match operator {
            FilterOperator::Eq | FilterOperator::In => stored.is_null(),
            FilterOperator::NotEq => !stored.is_null(),
            _ => false,
        };
    }
    let Some(ordering) = value.compare_stored(stored) else {
        return false;
    };
    match operator {
        FilterOperator::Eq | FilterOperator::In => ordering == Ordering::Equal,
        FilterOperator::NotEq => ordering != Ordering::Equal,
        FilterOperator::Lt => ordering == Ordering::Less,
        FilterOperator::LtEq => ordering != Ordering::Greater,
        FilterOperator::Gt => ordering == Ordering::Greater,
        FilterOperator::GtEq => ordering != Ordering::Less,
    }
}

fn predicate_column(predicate: &Predicate) -> &ColumnRef {
    match predicate {
        Predicate::Compare { column, .. } | Predicate::In { column, .. } => column,
    }
}

fn row_matches(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::Compare {
            column,
            operator,
            value,
        } => {
            let stored = row.get(&column.column).unwrap_or(&Value::Null);
            compare_matches(*operator, value, stored)
        }
        Predicate::In { column, values } => {
            let stored = row.get(&column.column).unwrap_or(&Value::Null);
            values
                .iter()
                .any(|value| compare_matches(FilterOperator::Eq, value, stored))
        }
    }
}

impl MemoryQuery {
    /// Ids of matching rows in query order, before the window
    fn matching(&self, tables: &Tables) -> Result<Vec<i64>, StoreError> {
        let table = self.store.table(&self.entity_type)?;

        let mut by_path: IndexMap<Option<&str>, Vec<&Predicate>> = IndexMap::new();
        for predicate in &self.predicates {
            by_path
                .entry(predicate_column(predicate).path.as_deref())
                .or_default()
                .push(predicate);
        }

        let mut matched: Vec<(i64, &Row)> = tables
            .rows(&self.entity_type)
            .filter(|(_, row)| {
                by_path.iter().all(|(path, predicates)| match path {
                    None => predicates.iter().all(|p| row_matches(p, row)),
                    Some(path) => self
                        .store
                        .walk(tables, table, row, path)
                        .into_iter()
                        .any(|related| predicates.iter().all(|p| row_matches(p, related))),
                })
            })
            .map(|(id, row)| (*id, row))
            .collect();

        if !self.orders.is_empty() {
            let sort_value = |row: &Row, column: &ColumnRef| -> Value {
                match &column.path {
                    None => row.get(&column.column).cloned().unwrap_or(Value::Null),
                    Some(path) => self
                        .store
                        .walk(tables, table, row, path)
                        .first()
                        .and_then(|r| r.get(&column.column).cloned())
                        .unwrap_or(Value::Null),
                }
            };
            let column_types: Vec<ColumnType> = self
                .orders
                .iter()
                .map(|(column, _)| self.order_column_type(column))
                .collect();
            matched.sort_by(|x, y| {
                for ((column, direction), column_type) in self.orders.iter().zip(&column_types) {
                    let ordering =
                        column_type.compare(&sort_value(x.1, column), &sort_value(y.1, column));
                    let ordering = match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        Ok(matched.into_iter().map(|(id, _)| id).collect())
    }

    /// Declared type of an order column, following its join path
    fn order_column_type(&self, column: &ColumnRef) -> ColumnType {
        let mut entity_type = self.entity_type.as_str();
        for segment in column.path.iter().flat_map(|path| path.split('.')) {
            match self
                .store
                .schema
                .get(entity_type)
                .and_then(|table| table.associations.get(segment))
            {
                Some(info) => entity_type = info.target_type.as_str(),
                None => return ColumnType::Other,
            }
        }
        self.store
            .column_type(entity_type, &column.column)
            .unwrap_or(ColumnType::Other)
    }

    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

impl Query for MemoryQuery {
    type Entity = Record;

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn order_by(mut self, column: ColumnRef, direction: SortDirection) -> Self {
        self.orders.push((column, direction));
        self
    }

    fn join(mut self, path: &str) -> Self {
        if !self.is_joined(path) {
            self.joins.push(path.to_string());
        }
        self
    }

    fn is_joined(&self, path: &str) -> bool {
        self.joins.iter().any(|j| j == path)
    }

    fn include(mut self, paths: &[String]) -> Self {
        for path in paths {
            if !self.includes.contains(path) {
                self.includes.push(path.clone());
            }
        }
        self
    }

    fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn count(&self) -> Result<usize, StoreError> {
        let tables = self.store.read()?;
        Ok(self.matching(&tables)?.len())
    }

    fn first(&self) -> Result<Option<Record>, StoreError> {
        Ok(self.clone().limit(1).load()?.into_iter().next())
    }

    fn load(&self) -> Result<Vec<Record>, StoreError> {
        let table = self.store.table(&self.entity_type)?.clone();
        let tables = self.store.read()?;
        let ids = self.matching(&tables)?;
        let window = ids
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX));

        let mut records = Vec::new();
        for id in window {
            let Some(row) = tables.rows.get(&self.entity_type).and_then(|rows| rows.get(&id)) else {
                continue;
            };
            let mut record = Record::from_row(table.clone(), row.clone());
            self.store.attach(&tables, &mut record, &self.includes);
            records.push(record);
        }
        Ok(records)
    }
}
