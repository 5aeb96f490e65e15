//! Validation and persistence orchestration
//!
//! Sequences lifecycle hooks, validation, persistence and error extraction
//! around an entity produced by the merge engine. Failures come back as a
//! status plus a flat, path-qualified error list; a failure never comes back
//! with an empty list.

use axum::http::StatusCode;
use serde_json::Value;
use std::collections::HashSet;

use super::context::RequestContext;
use super::entity::{Entity, EntityGraph, ValidationErrors};
use super::error::{ConfigError, ErrorEntry};
use super::field::ColumnType;
use super::metadata::{AttributeBehavior, Hook, ModelMetadata};
use super::operation::Operation;
use super::registry::Registry;
use super::store::Store;

/// Hooks supplied for a single save, run after the model's own hook of the
/// same name
#[derive(Debug, Clone, Default)]
pub struct SaveHooks {
    pub before_validate: Option<Hook>,
    pub before_create: Option<Hook>,
    pub before_save: Option<Hook>,
    pub after_create: Option<Hook>,
    pub after_save: Option<Hook>,
}

/// Result of a save or destroy
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub status: StatusCode,
    pub errors: Vec<ErrorEntry>,
}

impl SaveOutcome {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Records an instance as visited; unsaved instances are always new
fn first_visit(visited: &mut HashSet<(String, String)>, entity: &dyn Entity) -> bool {
    match entity.primary_key() {
        Some(key) => visited.insert((entity.entity_type().to_string(), key.to_string())),
        None => true,
    }
}

fn run(hook: &Option<Hook>, entity: &mut dyn Entity, ctx: &RequestContext) {
    if let Some(hook) = hook {
        hook(entity, ctx);
    }
}

pub struct Persistence<'a, S: Store> {
    registry: &'a Registry,
    store: &'a S,
}

impl<'a, S: Store> Persistence<'a, S> {
    pub fn new(registry: &'a Registry, store: &'a S) -> Self {
        Self { registry, store }
    }

    /// Validate and persist `entity` and its loaded association graph
    pub fn save(
        &self,
        entity: &mut S::Entity,
        operation: Operation,
        ctx: &RequestContext,
        hooks: &SaveHooks,
    ) -> Result<SaveOutcome, ConfigError> {
        let model = self.registry.model(entity.entity_type())?;

        run(&model.before_validate, entity, ctx);
        run(&hooks.before_validate, entity, ctx);
        if let Some(validator) = model.validator(operation) {
            validator(entity, ctx);
        }
        self.validate_graph(entity)?;

        let is_new = entity.is_new();
        let mut saved = false;
        if entity.errors().is_empty() {
            if is_new {
                run(&model.before_create, entity, ctx);
                run(&hooks.before_create, entity, ctx);
            }
            run(&model.before_save, entity, ctx);
            run(&hooks.before_save, entity, ctx);

            if entity.errors().is_empty() {
                saved = match self.store.save(entity) {
                    Ok(saved) => saved,
                    Err(e) => {
                        tracing::warn!(entity_type = %entity.entity_type(), error = %e, "save failed");
                        false
                    }
                };
            }
        }

        if saved {
            if is_new {
                run(&model.after_create, entity, ctx);
                run(&hooks.after_create, entity, ctx);
            }
            run(&model.after_save, entity, ctx);
            run(&hooks.after_save, entity, ctx);
            return Ok(SaveOutcome::ok());
        }

        let mut errors = self.extract_errors(entity)?;
        if errors.is_empty() {
            errors.push(ErrorEntry::unspecified(operation));
        }
        Ok(SaveOutcome {
            status: StatusCode::BAD_REQUEST,
            errors,
        })
    }

    /// Run the operation's read validator (`show`, `destroy`, ...) against a
    /// loaded entity, returning the errors it recorded
    pub fn validate_read(
        &self,
        entity: &mut S::Entity,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Vec<ErrorEntry>, ConfigError> {
        let model = self.registry.model(entity.entity_type())?;
        if let Some(validator) = model.validator(operation) {
            validator(entity, ctx);
        }
        self.extract_errors(entity)
    }

    /// Soft-delete (when the type declares a marker column) or hard-delete
    pub fn destroy(
        &self,
        entity: &mut S::Entity,
        operation: Operation,
    ) -> Result<SaveOutcome, ConfigError> {
        let model = self.registry.model(entity.entity_type())?;
        let destroyed = entity.errors().is_empty() && self.destroy_entity(entity, &model);
        if destroyed && entity.errors().is_empty() {
            return Ok(SaveOutcome::ok());
        }

        let errors = self.extract_errors(entity)?;
        if errors.is_empty() {
            return Ok(SaveOutcome {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                errors: vec![ErrorEntry::unspecified(operation)],
            });
        }
        Ok(SaveOutcome {
            status: StatusCode::BAD_REQUEST,
            errors,
        })
    }

    fn destroy_entity(&self, entity: &mut S::Entity, model: &ModelMetadata) -> bool {
        let entity_type = entity.entity_type().to_string();
        let marker = model.soft_delete.as_ref().and_then(|column| {
            match self.store.column_type(&entity_type, column) {
                Some(ColumnType::Boolean) => Some((column, Value::Bool(true))),
                Some(ColumnType::Integer | ColumnType::Decimal) => Some((column, Value::from(1))),
                _ => None,
            }
        });

        let result = match marker {
            Some((column, value)) => match entity.set_field(column, value) {
                Ok(()) => self.store.save(entity),
                Err(e) => {
                    tracing::warn!(entity_type = %entity_type, error = %e, "could not set soft-delete marker");
                    return false;
                }
            },
            None => self.store.destroy(entity),
        };
        match result {
            Ok(done) => done,
            Err(e) => {
                tracing::warn!(entity_type = %entity_type, error = %e, "destroy failed");
                false
            }
        }
    }

    /// Structural validation of the entity and its loaded children
    ///
    /// Errors already present (from hooks or the merge engine) are kept. A
    /// child with errors marks its association attribute on the parent.
    fn validate_graph(&self, entity: &mut S::Entity) -> Result<(), ConfigError> {
        let mut visited = HashSet::new();
        self.validate_node(entity, &mut visited)?;
        Ok(())
    }

    fn validate_node(
        &self,
        entity: &mut S::Entity,
        visited: &mut HashSet<(String, String)>,
    ) -> Result<bool, ConfigError> {
        if !first_visit(visited, entity) {
            return Ok(entity.errors().is_empty());
        }

        let existing = std::mem::take(entity.errors_mut());
        self.store.validate(entity);
        let structural = std::mem::take(entity.errors_mut());
        let mut merged: ValidationErrors = existing;
        merged.merge(structural);
        *entity.errors_mut() = merged;

        let entity_type = entity.entity_type().to_string();
        let associations: Vec<(String, AttributeBehavior)> = self
            .registry
            .attributes(&entity_type)?
            .values()
            .filter(|attr| attr.behavior().is_association())
            .map(|attr| (attr.key.clone(), attr.behavior().clone()))
            .collect();

        for (key, behavior) in associations {
            let mut invalid = false;
            match behavior {
                AttributeBehavior::ToOne(_) => {
                    if let Some(child) = entity.to_one_mut(&key) {
                        invalid |= !self.validate_node(child, visited)?;
                    }
                }
                AttributeBehavior::ToMany(_) => {
                    if let Some(children) = entity.to_many_mut(&key) {
                        for child in children.iter_mut() {
                            invalid |= !self.validate_node(child, visited)?;
                        }
                    }
                }
                AttributeBehavior::Plain => {}
            }
            if invalid {
                entity.add_error(&key, "is invalid");
            }
        }
        Ok(entity.errors().is_empty())
    }

    /// Flatten the entity's errors into path-qualified entries
    ///
    /// Errors on association attributes are replaced by the children's own
    /// errors (`items[2].quantity`, `shippingAddress->city`) when there are
    /// any. Each child is reported once.
    pub fn extract_errors(&self, entity: &S::Entity) -> Result<Vec<ErrorEntry>, ConfigError> {
        let mut visited = HashSet::new();
        let mut entries = Vec::new();
        self.extract_into(entity, "", &mut visited, &mut entries)?;
        Ok(entries)
    }

    fn extract_into(
        &self,
        entity: &S::Entity,
        prefix: &str,
        visited: &mut HashSet<(String, String)>,
        entries: &mut Vec<ErrorEntry>,
    ) -> Result<(), ConfigError> {
        let entity_type = entity.entity_type();
        let object = (!prefix.is_empty()).then(|| prefix.to_string());

        for (key, messages) in entity.errors().iter() {
            if key == ValidationErrors::BASE {
                for message in messages {
                    entries.push(ErrorEntry::for_base(object.clone(), message.clone()));
                }
                continue;
            }

            let attr = self.registry.attribute(entity_type, key);
            let external = match attr {
                Some(attr) => self.registry.external_name(attr),
                None => self.registry.naming().external(key),
            };

            let mut nested = Vec::new();
            if let Some(attr) = attr {
                match attr.behavior() {
                    AttributeBehavior::ToOne(_) => {
                        if let Some(child) = entity.to_one(key) {
                            if first_visit(visited, child) {
                                let child_prefix = format!("{}{}->", prefix, external);
                                self.extract_into(child, &child_prefix, visited, &mut nested)?;
                            }
                        }
                    }
                    AttributeBehavior::ToMany(_) => {
                        for (index, child) in entity.to_many(key).iter().enumerate() {
                            if first_visit(visited, child) {
                                let child_prefix = format!("{}{}[{}].", prefix, external, index);
                                self.extract_into(child, &child_prefix, visited, &mut nested)?;
                            }
                        }
                    }
                    AttributeBehavior::Plain => {}
                }
            }

            if nested.is_empty() {
                let qualified = format!("{}{}", prefix, external);
                for message in messages {
                    entries.push(ErrorEntry::for_attribute(
                        object.clone(),
                        qualified.clone(),
                        message.clone(),
                    ));
                }
            } else {
                entries.extend(nested);
            }
        }
        Ok(())
    }
}
