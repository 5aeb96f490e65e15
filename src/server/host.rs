//! Server host holding everything a request needs
//!
//! The host is transport-agnostic: it owns the registry, the store, the
//! configuration and the auth provider, and hands out the per-request engines
//! (composer, update engine, persistence, serializer) borrowed from them.

use chrono::FixedOffset;
use std::sync::Arc;

use super::envelope::Envelope;
use crate::config::ApiConfig;
use crate::core::auth::AuthProvider;
use crate::core::compose::QueryComposer;
use crate::core::error::{ApiError, ConfigError};
use crate::core::merge::UpdateEngine;
use crate::core::persist::Persistence;
use crate::core::registry::Registry;
use crate::core::serialize::Serializer;
use crate::core::store::Store;

pub struct ApiHost<S: Store> {
    pub registry: Arc<Registry>,
    pub store: Arc<S>,
    pub config: Arc<ApiConfig>,
    pub auth: Arc<dyn AuthProvider>,
    default_zone: FixedOffset,
}

impl<S: Store> ApiHost<S> {
    /// Assemble a host; fails when the configuration is invalid
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<S>,
        config: ApiConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let default_zone = config.time_zone()?;
        if registry.naming() != config.naming() {
            tracing::warn!("registry naming differs from the configured naming; the registry wins");
        }
        Ok(Self {
            registry,
            store,
            config: Arc::new(config),
            auth,
            default_zone,
        })
    }

    /// Entity types served by this host
    pub fn entity_types(&self) -> Vec<&str> {
        self.registry.entity_types().collect()
    }

    /// Resolve a resource path segment (`books`) to its entity type
    pub fn entity_type(&self, resource: &str) -> Result<String, ApiError> {
        self.registry
            .resource_type(resource)
            .map(str::to_string)
            .ok_or_else(|| ApiError::not_found("resource"))
    }

    pub fn default_zone(&self) -> FixedOffset {
        self.default_zone
    }

    pub fn composer(&self) -> QueryComposer<'_, S> {
        QueryComposer::new(&self.registry, &self.store, self.default_zone)
    }

    pub fn update_engine(&self) -> UpdateEngine<'_, S> {
        UpdateEngine::new(&self.registry, &self.store, self.composer())
    }

    pub fn persistence(&self) -> Persistence<'_, S> {
        Persistence::new(&self.registry, &self.store)
    }

    pub fn serializer(&self) -> Serializer<'_> {
        Serializer::new(&self.registry).with_links_prefix(self.config.links_prefix.clone())
    }

    /// Collection path of a resource, including the links prefix
    pub fn collection_href(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.config.links_prefix.trim_end_matches('/'),
            resource
        )
    }

    /// Render an error with this host's detail exposure setting
    pub fn error_envelope(&self, err: &ApiError) -> Envelope {
        Envelope::from_error(err, self.config.expose_error_details)
    }
}
