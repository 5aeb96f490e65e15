//! Update/merge engine: applies an inbound payload to an entity graph
//!
//! Payload keys are matched against the attributes visible for the
//! operation by external name. Plain attributes are written through the
//! declared setter or the entity's own field setter; association attributes
//! recurse into matched or newly created children:
//!
//! - to-one: the loaded child if there is one, else a child matched by the
//!   target's id-attribute combinations, else a new child
//! - to-many: each element is matched against the loaded children, then the
//!   store, then created; unmentioned loaded children are kept
//!
//! Keys that cannot be applied are recorded in [`IgnoredFields`] rather than
//! failing the request.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::compose::QueryComposer;
use super::context::{IgnoredFields, RequestContext};
use super::entity::{Entity, EntityGraph, loosely_equal};
use super::error::{AttributeError, MergeError, StoreError};
use super::field::ColumnType;
use super::metadata::{AssociationInfo, AttributeBehavior, AttributeMetadata, ExceptionHandler};
use super::operation::Operation;
use super::registry::{Registry, ResolvedAttributes};
use super::store::{Query, Store, eq_predicate};

/// Caller-supplied child resolution, consulted before id matching
///
/// Receives the parent, the association attribute and the child payload.
pub type Resolver<'a, E> =
    Box<dyn Fn(&E, &AttributeMetadata, &Map<String, Value>) -> Result<Option<E>, StoreError> + 'a>;

pub struct UpdateEngine<'a, S: Store> {
    registry: &'a Registry,
    store: &'a S,
    composer: QueryComposer<'a, S>,
    resolver: Option<Resolver<'a, S::Entity>>,
    resolved: HashMap<(String, Operation), ResolvedAttributes<'a>>,
}

impl<'a, S: Store> UpdateEngine<'a, S> {
    pub fn new(registry: &'a Registry, store: &'a S, composer: QueryComposer<'a, S>) -> Self {
        Self {
            registry,
            store,
            composer,
            resolver: None,
            resolved: HashMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Resolver<'a, S::Entity>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Apply `payload` to `entity` for `operation`
    ///
    /// The request scope is written onto the entity first. Unknown or
    /// unwritable keys are appended to `ignored`; validation-style problems
    /// (wrong payload shapes, mapped setter errors) are recorded on the
    /// entity. Only setter errors with no matching exception policy escape.
    pub fn apply_updates(
        &mut self,
        entity: &mut S::Entity,
        payload: &Map<String, Value>,
        operation: Operation,
        ctx: &RequestContext,
        ignored: &mut IgnoredFields,
    ) -> Result<(), MergeError> {
        let entity_type = entity.entity_type().to_string();
        let resolved = self.registry.resolve(&entity_type, operation, ctx)?;
        self.apply_scope(entity, ctx);
        self.apply_resolved(entity, payload, &resolved, ctx, ignored)
    }

    fn apply_scope(&self, entity: &mut S::Entity, ctx: &RequestContext) {
        for (key, value) in &ctx.scope {
            if !entity.has_field(key) {
                continue;
            }
            if let Err(e) = entity.set_field(key, value.clone()) {
                tracing::warn!(key = %key, error = %e, "could not assign scope value, skipping");
            }
        }
    }

    fn apply_resolved(
        &mut self,
        entity: &mut S::Entity,
        payload: &Map<String, Value>,
        resolved: &ResolvedAttributes<'a>,
        ctx: &RequestContext,
        ignored: &mut IgnoredFields,
    ) -> Result<(), MergeError> {
        for (external, raw) in payload {
            let Some(attr) = resolved.by_external(external) else {
                ignored.push(external.clone(), raw.clone());
                continue;
            };
            let value = match &attr.parse {
                Some(transform) => match transform(raw.clone(), ctx) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!(attribute = %attr.key, error = %e, "payload value transform failed, using raw value");
                        raw.clone()
                    }
                },
                None => raw.clone(),
            };

            match attr.behavior() {
                AttributeBehavior::ToOne(info) if attr.parse.is_none() => {
                    self.update_to_one(entity, attr, info, external, value, ctx, ignored)?
                }
                AttributeBehavior::ToMany(info) if attr.parse.is_none() => {
                    self.update_to_many(entity, attr, info, external, value, ctx, ignored)?
                }
                _ => self.write_plain(entity, attr, external, value, ctx, ignored)?,
            }
        }
        Ok(())
    }

    fn write_plain(
        &self,
        entity: &mut S::Entity,
        attr: &AttributeMetadata,
        external: &str,
        value: Value,
        ctx: &RequestContext,
        ignored: &mut IgnoredFields,
    ) -> Result<(), MergeError> {
        let result = match &attr.setter {
            Some(setter) => setter(entity, value.clone(), ctx),
            None => entity.set_field(&attr.key, value.clone()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(AttributeError::NoSuchField(_)) if attr.setter.is_none() => {
                tracing::warn!(attribute = %attr.key, "no setter for payload attribute, skipping");
                ignored.push(external, value);
                Ok(())
            }
            Err(error) => {
                let Some((_, handler)) = attr
                    .on_exception
                    .iter()
                    .find(|(matcher, _)| matcher.matches(&error))
                else {
                    return Err(MergeError::Unhandled {
                        path: format!("{}{}", ctx.path_prefix, external),
                        source: error,
                    });
                };
                match handler {
                    ExceptionHandler::Callback(f) => f(entity, &error, ctx),
                    ExceptionHandler::Message(message) => entity.add_error(&attr.key, message),
                    ExceptionHandler::Ignore => ignored.push(external, value),
                }
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_to_one(
        &mut self,
        entity: &mut S::Entity,
        attr: &AttributeMetadata,
        info: &AssociationInfo,
        external: &str,
        value: Value,
        ctx: &RequestContext,
        ignored: &mut IgnoredFields,
    ) -> Result<(), MergeError> {
        let Value::Object(payload) = value else {
            entity.add_error(&attr.key, "must be supplied as an object");
            return Ok(());
        };
        if payload.is_empty() {
            return Ok(());
        }

        let mut child = match entity.to_one(&attr.key).cloned() {
            Some(loaded) => loaded,
            None => self.resolve_child(entity, attr, info, &payload, ctx)?,
        };
        let prefix = format!("{}{}->", ctx.path_prefix, external);
        let child_ignored = self.update_child(entity, &mut child, info, &payload, prefix, ctx)?;
        ignored.push_nested(external, child_ignored);
        entity.set_to_one(&attr.key, Some(child));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn update_to_many(
        &mut self,
        entity: &mut S::Entity,
        attr: &AttributeMetadata,
        info: &AssociationInfo,
        external: &str,
        value: Value,
        ctx: &RequestContext,
        ignored: &mut IgnoredFields,
    ) -> Result<(), MergeError> {
        let Value::Array(items) = value else {
            entity.add_error(&attr.key, "must be supplied as an array of objects");
            return Ok(());
        };

        let mut children: Vec<S::Entity> = entity.to_many(&attr.key).to_vec();
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(payload) = item else {
                entity.add_error(&attr.key, "must be supplied as an array of objects");
                continue;
            };
            if payload.is_empty() {
                continue;
            }

            let loaded = self.match_loaded(&children, &info.target_type, &payload);
            let mut child = match loaded {
                Some(position) => children[position].clone(),
                None => self.resolve_child(entity, attr, info, &payload, ctx)?,
            };
            let prefix = format!("{}{}[{}].", ctx.path_prefix, external, index);
            let child_ignored = self.update_child(entity, &mut child, info, &payload, prefix, ctx)?;
            ignored.push_nested(format!("{}[{}]", external, index), child_ignored);

            let position = loaded.or_else(|| {
                let key = child.primary_key()?;
                children
                    .iter()
                    .position(|c| c.primary_key().is_some_and(|k| loosely_equal(&k, &key)))
            });
            match position {
                Some(position) => children[position] = child,
                None => children.push(child),
            }
        }
        entity.set_to_many(&attr.key, children);
        Ok(())
    }

    /// Link a child to its parent and apply its payload
    fn update_child(
        &mut self,
        parent: &S::Entity,
        child: &mut S::Entity,
        info: &AssociationInfo,
        payload: &Map<String, Value>,
        prefix: String,
        ctx: &RequestContext,
    ) -> Result<IgnoredFields, MergeError> {
        let operation = if child.is_new() {
            Operation::Create
        } else {
            Operation::Update
        };

        if !info.owns_foreign_key {
            if let Some(parent_key) = parent.primary_key() {
                if let Err(e) = child.set_field(&info.foreign_key, parent_key) {
                    tracing::warn!(foreign_key = %info.foreign_key, error = %e, "could not link child to parent");
                }
            }
        }

        let nested_ctx = ctx.nested(operation, prefix);
        let resolved = self.resolved_for(&info.target_type, operation, &nested_ctx)?;
        let mut child_ignored = IgnoredFields::new();
        self.apply_resolved(child, payload, &resolved, &nested_ctx, &mut child_ignored)?;

        let model = self.registry.model(&info.target_type)?;
        if let Some(hook) = &model.after_initialize {
            hook(child, &nested_ctx);
        }
        Ok(child_ignored)
    }

    fn resolved_for(
        &mut self,
        entity_type: &str,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<ResolvedAttributes<'a>, MergeError> {
        let cache_key = (entity_type.to_string(), operation);
        if let Some(resolved) = self.resolved.get(&cache_key) {
            return Ok(resolved.clone());
        }
        let registry: &'a Registry = self.registry;
        let resolved = registry.resolve(entity_type, operation, ctx)?;
        self.resolved.insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    /// Find a match among the id-attribute combinations fully present in
    /// the payload, returning `(attribute key, payload value)` pairs
    fn id_values(&self, target_type: &str, payload: &Map<String, Value>) -> Option<Vec<(String, Value)>> {
        let model = self.registry.model(target_type).ok()?;
        model.id_attributes.iter().find_map(|combination| {
            combination
                .iter()
                .map(|key| {
                    let external = self
                        .registry
                        .attribute(target_type, key)
                        .map(|attr| self.registry.external_name(attr))
                        .unwrap_or_else(|| key.clone());
                    payload
                        .get(&external)
                        .or_else(|| payload.get(key))
                        .filter(|v| !v.is_null())
                        .map(|v| (key.clone(), v.clone()))
                })
                .collect::<Option<Vec<_>>>()
        })
    }

    fn match_loaded(
        &self,
        children: &[S::Entity],
        target_type: &str,
        payload: &Map<String, Value>,
    ) -> Option<usize> {
        let ids = self.id_values(target_type, payload)?;
        children.iter().position(|child| {
            ids.iter().all(|(key, value)| {
                child
                    .field(key)
                    .is_some_and(|current| loosely_equal(&current, value))
            })
        })
    }

    /// Resolver callback, then id-attribute match in the store, then a new child
    fn resolve_child(
        &self,
        parent: &S::Entity,
        attr: &AttributeMetadata,
        info: &AssociationInfo,
        payload: &Map<String, Value>,
        ctx: &RequestContext,
    ) -> Result<S::Entity, MergeError> {
        if let Some(resolver) = &self.resolver {
            if let Some(child) = resolver(parent, attr, payload)? {
                return Ok(child);
            }
        }

        if let Some(ids) = self.id_values(&info.target_type, payload) {
            let lookup_ctx = ctx.nested(Operation::Update, "");
            let mut query = self
                .composer
                .base_query(&info.target_type, &lookup_ctx)?;
            for (key, value) in &ids {
                let column_type = self
                    .store
                    .column_type(&info.target_type, key)
                    .unwrap_or(ColumnType::Other);
                query = query.filter(eq_predicate(key, column_type, value));
            }
            if query.count()? == 1 {
                if let Some(found) = query.first()? {
                    return Ok(found);
                }
            }
        }

        Ok(self.store.instantiate(&info.target_type)?)
    }
}
