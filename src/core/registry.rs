//! Attribute metadata registry
//!
//! The registry is assembled once with [`RegistryBuilder`], flattened
//! (supertype declarations merged into subtypes, associations characterized,
//! id-attribute combinations derived) and then never changes. A process-wide
//! instance can be installed with [`init`] and fetched with [`global`].

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use super::context::RequestContext;
use super::error::ConfigError;
use super::metadata::{AttributeBehavior, AttributeMetadata, ModelMetadata};
use super::naming::{Naming, pluralize};
use super::operation::Operation;
use super::store::AssociationLookup;

/// A registered type's flattened declarations
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub metadata: ModelMetadata,
    pub attributes: IndexMap<String, AttributeMetadata>,
}

/// Immutable metadata for every registered entity type
#[derive(Debug, Clone)]
pub struct Registry {
    naming: Naming,
    models: IndexMap<String, RegisteredModel>,
}

/// Attributes visible for one operation, in declaration order
#[derive(Debug, Clone)]
pub struct ResolvedAttributes<'a> {
    entity_type: &'a str,
    naming: Naming,
    attributes: Vec<&'a AttributeMetadata>,
}

impl<'a> ResolvedAttributes<'a> {
    pub fn entity_type(&self) -> &'a str {
        self.entity_type
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a AttributeMetadata> + '_ {
        self.attributes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&'a AttributeMetadata> {
        self.iter().find(|attr| attr.key == key)
    }

    /// Look up by external (payload/response) name
    pub fn by_external(&self, name: &str) -> Option<&'a AttributeMetadata> {
        self.iter()
            .find(|attr| self.naming.external(attr.base_name()) == name)
    }

    /// Look up by query-string name, falling back to the internal key
    pub fn by_query(&self, name: &str) -> Option<&'a AttributeMetadata> {
        self.iter()
            .find(|attr| self.naming.query(attr.base_name()) == name)
            .or_else(|| self.get(name))
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn naming(&self) -> Naming {
        self.naming
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.models.contains_key(entity_type)
    }

    fn registered(&self, entity_type: &str) -> Result<&RegisteredModel, ConfigError> {
        self.models
            .get(entity_type)
            .ok_or_else(|| ConfigError::UnknownEntityType(entity_type.to_string()))
    }

    pub fn model(&self, entity_type: &str) -> Result<&ModelMetadata, ConfigError> {
        Ok(&self.registered(entity_type)?.metadata)
    }

    /// Every declared attribute, regardless of visibility
    pub fn attributes(
        &self,
        entity_type: &str,
    ) -> Result<&IndexMap<String, AttributeMetadata>, ConfigError> {
        Ok(&self.registered(entity_type)?.attributes)
    }

    pub fn attribute(&self, entity_type: &str, key: &str) -> Option<&AttributeMetadata> {
        self.models.get(entity_type)?.attributes.get(key)
    }

    /// Attributes visible for `operation` under `ctx`, in declaration order
    pub fn resolve(
        &self,
        entity_type: &str,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<ResolvedAttributes<'_>, ConfigError> {
        let (entity_type, model) = self
            .models
            .get_key_value(entity_type)
            .ok_or_else(|| ConfigError::UnknownEntityType(entity_type.to_string()))?;
        Ok(ResolvedAttributes {
            entity_type: entity_type.as_str(),
            naming: self.naming,
            attributes: model
                .attributes
                .values()
                .filter(|attr| attr.is_visible(operation, ctx))
                .collect(),
        })
    }

    pub fn external_name(&self, attr: &AttributeMetadata) -> String {
        self.naming.external(attr.base_name())
    }

    pub fn query_name(&self, attr: &AttributeMetadata) -> String {
        self.naming.query(attr.base_name())
    }

    /// Singular external name of an entity type (the root key for one object)
    pub fn singular_name(&self, entity_type: &str) -> Result<String, ConfigError> {
        let model = self.model(entity_type)?;
        Ok(self
            .naming
            .external(model.alias.as_deref().unwrap_or(entity_type)))
    }

    /// Plural external name of an entity type (the root key for collections)
    pub fn plural_name(&self, entity_type: &str) -> Result<String, ConfigError> {
        let model = self.model(entity_type)?;
        match &model.plural {
            Some(plural) => Ok(self.naming.external(plural)),
            None => Ok(pluralize(&self.singular_name(entity_type)?)),
        }
    }

    /// Find the entity type served under a plural path segment
    pub fn resource_type(&self, segment: &str) -> Option<&str> {
        self.entity_types().find(|entity_type| {
            self.plural_name(entity_type).is_ok_and(|plural| {
                plural == segment || self.naming.query(&plural) == segment
            })
        })
    }

    /// Context for rendering or loading through an association attribute
    ///
    /// The attribute's nested subset and exclusions replace the caller's;
    /// the foreign key pointing back at the parent is dropped when the
    /// parent does not own it.
    pub fn nested_context(
        &self,
        attr: &AttributeMetadata,
        operation: Operation,
        ctx: &RequestContext,
        prefix: impl Into<String>,
    ) -> RequestContext {
        let mut nested = ctx.nested(operation, prefix);
        nested.only = attr.attributes.clone();
        nested.except = attr.except_attributes.clone().unwrap_or_default();
        if let Some(info) = attr.association_info() {
            if !info.owns_foreign_key {
                nested.except.push(info.foreign_key.clone());
            }
        }
        nested
    }

    /// Association paths to eager-load for rendering `entity_type`
    ///
    /// Visible association attributes are followed recursively; a type that
    /// is already on the current path is included but not re-entered.
    pub fn include_paths(
        &self,
        entity_type: &str,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, ConfigError> {
        let mut paths = Vec::new();
        let mut on_path = Vec::new();
        self.collect_includes(entity_type, operation, ctx, "", &mut on_path, &mut paths)?;
        Ok(paths)
    }

    fn collect_includes(
        &self,
        entity_type: &str,
        operation: Operation,
        ctx: &RequestContext,
        prefix: &str,
        on_path: &mut Vec<String>,
        paths: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        on_path.push(entity_type.to_string());
        let model = self.model(entity_type)?;
        for key in &model.eager_load {
            if !ctx.exclude_associations.contains(key) {
                let path = format!("{}{}", prefix, key);
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }

        let resolved = self.resolve(entity_type, operation, ctx)?;
        for attr in resolved.iter() {
            let Some(info) = attr.association_info() else {
                continue;
            };
            let path = format!("{}{}", prefix, attr.key);
            if !paths.contains(&path) {
                paths.push(path.clone());
            }
            if !on_path.contains(&info.target_type) {
                let nested = self.nested_context(attr, operation, ctx, "");
                self.collect_includes(
                    &info.target_type,
                    operation,
                    &nested,
                    &format!("{}.", path),
                    on_path,
                    paths,
                )?;
            }
        }
        on_path.pop();
        Ok(())
    }
}

/// Collects declarations and flattens them into a [`Registry`]
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    naming: Naming,
    models: IndexMap<String, ModelMetadata>,
    attributes: IndexMap<String, IndexMap<String, AttributeMetadata>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    /// Register (or merge into) a type's model metadata
    pub fn model(mut self, model: ModelMetadata) -> Self {
        let entity_type = model.entity_type.clone();
        match self.models.get_mut(&entity_type) {
            Some(existing) => {
                let current = std::mem::take(existing);
                *existing = current.merge(model);
            }
            None => {
                self.models.insert(entity_type.clone(), model);
            }
        }
        self.attributes.entry(entity_type).or_default();
        self
    }

    /// Register attributes; a key declared again is merged field-by-field
    pub fn attributes(
        mut self,
        entity_type: impl Into<String>,
        attributes: impl IntoIterator<Item = AttributeMetadata>,
    ) -> Self {
        let entity_type = entity_type.into();
        if !self.models.contains_key(&entity_type) {
            self.models
                .insert(entity_type.clone(), ModelMetadata::new(entity_type.clone()));
        }
        let table = self.attributes.entry(entity_type).or_default();
        for attr in attributes {
            match table.get_mut(&attr.key) {
                Some(existing) => {
                    let current = std::mem::take(existing);
                    *existing = current.merge(attr);
                }
                None => {
                    table.insert(attr.key.clone(), attr);
                }
            }
        }
        self
    }

    /// Flatten without consulting a store for association details
    pub fn build(self) -> Result<Registry, ConfigError> {
        self.flatten(None)
    }

    /// Flatten, characterizing undeclared attribute kinds through `lookup`
    pub fn build_with(self, lookup: &dyn AssociationLookup) -> Result<Registry, ConfigError> {
        self.flatten(Some(lookup))
    }

    fn flatten(self, lookup: Option<&dyn AssociationLookup>) -> Result<Registry, ConfigError> {
        let mut flattened: IndexMap<String, RegisteredModel> = IndexMap::new();
        for entity_type in self.models.keys() {
            let mut visiting = HashSet::new();
            self.flatten_type(entity_type, &mut visiting, &mut flattened)?;
        }

        for (entity_type, model) in flattened.iter_mut() {
            for attr in model.attributes.values_mut() {
                if attr.behavior.is_none() {
                    attr.behavior = Some(
                        lookup
                            .and_then(|l| l.association(entity_type, &attr.key))
                            .map(AttributeBehavior::from_association)
                            .unwrap_or(AttributeBehavior::Plain),
                    );
                }
                if attr.is_id() {
                    let combination = vec![attr.key.clone()];
                    if !model.metadata.id_attributes.contains(&combination) {
                        model.metadata.id_attributes.push(combination);
                    }
                }
            }
        }

        for (entity_type, model) in &flattened {
            for attr in model.attributes.values() {
                if let Some(info) = attr.association_info() {
                    if !flattened.contains_key(&info.target_type) {
                        return Err(ConfigError::UnknownTargetType {
                            entity_type: entity_type.clone(),
                            attribute: attr.key.clone(),
                            target: info.target_type.clone(),
                        });
                    }
                }
            }
        }

        tracing::debug!(types = flattened.len(), "metadata registry built");
        Ok(Registry {
            naming: self.naming,
            models: flattened,
        })
    }

    fn flatten_type(
        &self,
        entity_type: &str,
        visiting: &mut HashSet<String>,
        flattened: &mut IndexMap<String, RegisteredModel>,
    ) -> Result<RegisteredModel, ConfigError> {
        if let Some(done) = flattened.get(entity_type) {
            return Ok(done.clone());
        }
        if !visiting.insert(entity_type.to_string()) {
            return Err(ConfigError::InheritanceCycle(entity_type.to_string()));
        }
        let model = self
            .models
            .get(entity_type)
            .ok_or_else(|| ConfigError::UnknownEntityType(entity_type.to_string()))?
            .clone();
        let own = self.attributes.get(entity_type).cloned().unwrap_or_default();

        let registered = match model.extends.clone() {
            Some(parent_type) => {
                let parent = self.flatten_type(&parent_type, visiting, flattened)?;
                let mut attributes = parent.attributes;
                for (key, attr) in own {
                    match attributes.get_mut(&key) {
                        Some(existing) => {
                            let current = std::mem::take(existing);
                            *existing = current.merge(attr);
                        }
                        None => {
                            attributes.insert(key, attr);
                        }
                    }
                }
                RegisteredModel {
                    metadata: ModelMetadata::inherit(&parent.metadata, model),
                    attributes,
                }
            }
            None => RegisteredModel {
                metadata: model,
                attributes: own,
            },
        };
        flattened.insert(entity_type.to_string(), registered.clone());
        Ok(registered)
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Install the process-wide registry
///
/// The first call wins; later calls return the already-installed registry.
pub fn init(registry: Registry) -> Arc<Registry> {
    GLOBAL.get_or_init(|| Arc::new(registry)).clone()
}

/// The process-wide registry installed by [`init`]
pub fn global() -> Result<Arc<Registry>, ConfigError> {
    GLOBAL.get().cloned().ok_or(ConfigError::RegistryNotInitialized)
}
