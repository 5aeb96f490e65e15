//! Rendering entities into ordered JSON trees
//!
//! Output keys follow registry declaration order and use external names.
//! Associations recurse with the attribute's nested context, so a child is
//! rendered with the attribute's subset and exclusions rather than the
//! caller's.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::context::RequestContext;
use super::entity::{Entity, EntityGraph};
use super::error::ConfigError;
use super::metadata::{AttributeBehavior, AttributeMetadata};
use super::operation::Operation;
use super::query::Link;
use super::registry::Registry;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Text form of a value for use in a path
fn path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct Serializer<'a> {
    registry: &'a Registry,
    links_prefix: String,
}

impl<'a> Serializer<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            links_prefix: String::new(),
        }
    }

    /// Path prepended to every generated link, e.g. `/api`
    pub fn with_links_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.links_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Render one entity and, recursively, its loaded associations
    pub fn serialize<E: EntityGraph>(
        &self,
        entity: &E,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Value, ConfigError> {
        let resolved = self
            .registry
            .resolve(entity.entity_type(), operation, ctx)?;

        let mut object = Map::new();
        for attr in resolved.iter() {
            let value = self.attribute_value(entity, attr, operation, ctx)?;
            let value = self.render(attr, value, ctx);
            if value.is_null() && attr.hides_when_null() {
                continue;
            }
            object.insert(self.registry.external_name(attr), value);
        }
        Ok(Value::Object(object))
    }

    /// Render a root object with its `_links`
    pub fn serialize_with_links<E: EntityGraph>(
        &self,
        entity: &E,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Value, ConfigError> {
        let mut value = self.serialize(entity, operation, ctx)?;
        let links = self.links(entity)?;
        if let Value::Object(object) = &mut value {
            let links = links
                .into_iter()
                .map(|link| serde_json::json!({ "rel": link.rel, "href": link.href }))
                .collect();
            object.insert("_links".to_string(), Value::Array(links));
        }
        Ok(value)
    }

    pub fn serialize_all<E: EntityGraph>(
        &self,
        entities: &[E],
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Vec<Value>, ConfigError> {
        entities
            .iter()
            .map(|entity| self.serialize_with_links(entity, operation, ctx))
            .collect()
    }

    /// `self` plus the model's declared link templates
    ///
    /// An unsaved entity has no `self` link.
    pub fn links(&self, entity: &dyn Entity) -> Result<Vec<Link>, ConfigError> {
        let entity_type = entity.entity_type();
        let model = self.registry.model(entity_type)?;
        let mut links = Vec::new();

        if let Some(key) = entity.primary_key() {
            let plural = self.registry.plural_name(entity_type)?;
            links.push(Link::new(
                "self",
                format!("{}/{}/{}", self.links_prefix, plural, path_segment(&key)),
            ));
        }

        for template in &model.links {
            let href = placeholder_pattern().replace_all(&template.href, |caps: &regex::Captures| {
                entity
                    .field(&caps[1])
                    .map(|value| path_segment(&value))
                    .unwrap_or_default()
            });
            links.push(Link::new(
                template.rel.clone(),
                format!("{}{}", self.links_prefix, href),
            ));
        }
        Ok(links)
    }

    fn attribute_value<E: EntityGraph>(
        &self,
        entity: &E,
        attr: &AttributeMetadata,
        operation: Operation,
        ctx: &RequestContext,
    ) -> Result<Value, ConfigError> {
        if attr.value.is_some() {
            return Ok(attr.read(entity, ctx));
        }

        let method = attr.render_method.as_deref();
        match attr.behavior() {
            AttributeBehavior::ToOne(_) => {
                let Some(child) = entity.to_one(&attr.key) else {
                    return Ok(Value::Null);
                };
                match method {
                    Some(method) => Ok(child.field(method).unwrap_or(Value::Null)),
                    None => {
                        let nested = self.registry.nested_context(attr, operation, ctx, "");
                        self.serialize(child, operation, &nested)
                    }
                }
            }
            AttributeBehavior::ToMany(_) => {
                let children = entity.to_many(&attr.key);
                match method {
                    Some(method) => Ok(Value::Array(
                        children
                            .iter()
                            .map(|child| child.field(method).unwrap_or(Value::Null))
                            .collect(),
                    )),
                    None => {
                        let nested = self.registry.nested_context(attr, operation, ctx, "");
                        let rendered = children
                            .iter()
                            .map(|child| self.serialize(child, operation, &nested))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Value::Array(rendered))
                    }
                }
            }
            AttributeBehavior::Plain => {
                let value = attr.read(entity, ctx);
                Ok(match (method, value) {
                    (Some(method), Value::Object(mut object)) => {
                        object.remove(method).unwrap_or(Value::Null)
                    }
                    (_, value) => value,
                })
            }
        }
    }

    fn render(&self, attr: &AttributeMetadata, value: Value, ctx: &RequestContext) -> Value {
        let Some(render) = &attr.render else {
            return value;
        };
        match render(value.clone(), ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(attribute = %attr.key, error = %e, "render transform failed, using raw value");
                value
            }
        }
    }
}
