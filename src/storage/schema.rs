//! Declarative table layout for the in-memory store

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::validators::ColumnValidator;
use crate::core::field::ColumnType;
use crate::core::metadata::AssociationInfo;

/// One typed column
#[derive(Clone)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub required: bool,
    pub unique: bool,
    pub default: Value,
    pub validators: Vec<ColumnValidator>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            required: false,
            unique: false,
            default: Value::Null,
            validators: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = value;
        self
    }

    pub fn validate_with(mut self, validator: ColumnValidator) -> Self {
        self.validators.push(validator);
        self
    }
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .field("required", &self.required)
            .field("unique", &self.unique)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Columns and associations of one entity type
///
/// The primary key is an auto-assigned integer column named `id`.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub entity_type: String,
    pub columns: IndexMap<String, ColumnDef>,
    pub associations: IndexMap<String, AssociationInfo>,
}

impl TableSchema {
    pub const PRIMARY_KEY: &'static str = "id";

    pub fn new(entity_type: impl Into<String>) -> Self {
        let mut columns = IndexMap::new();
        columns.insert(
            Self::PRIMARY_KEY.to_string(),
            ColumnDef::new(Self::PRIMARY_KEY, ColumnType::Integer),
        );
        Self {
            entity_type: entity_type.into(),
            columns,
            associations: IndexMap::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Declare an association; a to-one association holding the key also
    /// declares its integer key column
    pub fn association(mut self, key: impl Into<String>, info: AssociationInfo) -> Self {
        if info.owns_foreign_key && !self.columns.contains_key(&info.foreign_key) {
            self.columns.insert(
                info.foreign_key.clone(),
                ColumnDef::new(info.foreign_key.clone(), ColumnType::Integer),
            );
        }
        self.associations.insert(key.into(), info);
        self
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    /// A row holding every column's default
    pub fn default_row(&self) -> IndexMap<String, Value> {
        self.columns
            .values()
            .map(|c| (c.name.clone(), c.default.clone()))
            .collect()
    }
}

/// Every table known to a store
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: IndexMap<String, Arc<TableSchema>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables
            .insert(table.entity_type.clone(), Arc::new(table));
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<TableSchema>> {
        self.tables.get(entity_type)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values()
    }
}
