//! HTTP handlers for registered resources
//!
//! Handlers are generic over the store and entity-agnostic: the resource
//! path segment is resolved to an entity type through the registry, and all
//! behavior comes from the declared metadata.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::envelope::Envelope;
use super::extractors::{ApiRequest, JsonObject};
use super::host::ApiHost;
use crate::core::context::{IgnoredFields, RequestContext};
use crate::core::entity::Entity;
use crate::core::error::{ApiError, ApiResult};
use crate::core::field::ColumnType;
use crate::core::operation::Operation;
use crate::core::persist::SaveHooks;
use crate::core::query::{Pagination, paginate};
use crate::core::store::{Query, Store, eq_predicate};

fn respond<S: Store>(host: &ApiHost<S>, result: ApiResult<Envelope>) -> Response {
    match result {
        Ok(envelope) => envelope.into_response(),
        Err(err) => host.error_envelope(&err).into_response(),
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// GET /{resource}
pub async fn list<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path(resource): Path<String>,
    request: ApiRequest,
) -> Response {
    tracing::debug!(resource = %resource, "list");
    respond(&host, list_resources(&host, &resource, &request))
}

/// GET /{resource}/{id}
pub async fn show<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path((resource, id)): Path<(String, String)>,
    request: ApiRequest,
) -> Response {
    tracing::debug!(resource = %resource, id = %id, "show");
    respond(&host, show_resource(&host, &resource, &id, &request))
}

/// POST /{resource}
pub async fn create<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path(resource): Path<String>,
    request: ApiRequest,
    body: Result<JsonObject, ApiError>,
) -> Response {
    tracing::debug!(resource = %resource, "create");
    let result = body.and_then(|JsonObject(payload)| {
        create_resource(&host, &resource, &request, payload)
    });
    respond(&host, result)
}

/// PUT /{resource}/{id}
pub async fn update<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path((resource, id)): Path<(String, String)>,
    request: ApiRequest,
    body: Result<JsonObject, ApiError>,
) -> Response {
    tracing::debug!(resource = %resource, id = %id, "update");
    let result = body.and_then(|JsonObject(payload)| {
        update_resource(&host, &resource, &id, &request, payload, Operation::Update)
    });
    respond(&host, result)
}

/// PATCH /{resource}/{id}
pub async fn patch<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path((resource, id)): Path<(String, String)>,
    request: ApiRequest,
    body: Result<JsonObject, ApiError>,
) -> Response {
    tracing::debug!(resource = %resource, id = %id, "patch");
    let result = body.and_then(|JsonObject(payload)| {
        update_resource(&host, &resource, &id, &request, payload, Operation::Patch)
    });
    respond(&host, result)
}

/// DELETE /{resource}/{id}
pub async fn destroy<S: Store + 'static>(
    State(host): State<Arc<ApiHost<S>>>,
    Path((resource, id)): Path<(String, String)>,
    request: ApiRequest,
) -> Response {
    tracing::debug!(resource = %resource, id = %id, "destroy");
    respond(&host, destroy_resource(&host, &resource, &id, &request))
}

// ============================================================================
// Request processing
// ============================================================================

fn list_resources<S: Store>(
    host: &ApiHost<S>,
    resource: &str,
    request: &ApiRequest,
) -> ApiResult<Envelope> {
    let config = &host.config;
    let entity_type = host.entity_type(resource)?;
    let ctx = request.context(Operation::Index, config);
    let composer = host.composer();

    let query = composer.base_query(&entity_type, &ctx)?;
    let (query, result_filters) =
        composer.apply_filters(query, &entity_type, &request.filter_params(config), &ctx)?;
    let (query, result_sorts) =
        composer.apply_sorts(query, &entity_type, &request.sort_keys(config), &ctx)?;
    let includes = host
        .registry
        .include_paths(&entity_type, Operation::Index, &ctx)?;
    let query = query.include(&includes);
    let page_request = request.page_request(config)?;

    // Virtual criteria need the whole collection, so paging moves in memory
    let (entities, pagination) = if result_filters.is_empty() && result_sorts.is_empty() {
        let pagination = paginate(&query, page_request)?;
        (pagination.apply_window(query).load()?, pagination)
    } else {
        let mut entities = query.load()?;
        entities.retain(|entity| result_filters.matches(entity, &host.registry, &ctx));
        result_sorts.sort(&mut entities, &host.registry, &ctx);
        let pagination = Pagination::new(entities.len(), page_request);
        (pagination.window(entities), pagination)
    };

    let items = host
        .serializer()
        .serialize_all(&entities, Operation::Index, &ctx)?;
    let href = request.href(
        &host.collection_href(resource),
        &[&config.page_param, &config.page_size_param],
    );
    let links = pagination.links(&href, &config.page_param, &config.page_size_param);

    Ok(Envelope::new(StatusCode::OK)
        .with_payload(host.registry.plural_name(&entity_type)?, Value::Array(items))
        .with_pagination(&pagination)
        .with_links(&links))
}

fn show_resource<S: Store>(
    host: &ApiHost<S>,
    resource: &str,
    id: &str,
    request: &ApiRequest,
) -> ApiResult<Envelope> {
    let entity_type = host.entity_type(resource)?;
    let ctx = request.context(Operation::Show, &host.config);
    let mut entity = find_entity(host, &entity_type, id, &ctx)?;

    let errors = host
        .persistence()
        .validate_read(&mut entity, Operation::Show, &ctx)?;
    if !errors.is_empty() {
        return Err(ApiError::Validation { errors });
    }

    let object = host
        .serializer()
        .serialize_with_links(&entity, Operation::Show, &ctx)?;
    Ok(Envelope::new(StatusCode::OK).with_payload(host.registry.singular_name(&entity_type)?, object))
}

fn create_resource<S: Store>(
    host: &ApiHost<S>,
    resource: &str,
    request: &ApiRequest,
    payload: Map<String, Value>,
) -> ApiResult<Envelope> {
    let entity_type = host.entity_type(resource)?;
    let ctx = request.context(Operation::Create, &host.config);
    let entity = host.store.instantiate(&entity_type)?;
    write_entity(host, &entity_type, entity, payload, &ctx)
}

fn update_resource<S: Store>(
    host: &ApiHost<S>,
    resource: &str,
    id: &str,
    request: &ApiRequest,
    payload: Map<String, Value>,
    operation: Operation,
) -> ApiResult<Envelope> {
    let entity_type = host.entity_type(resource)?;
    let ctx = request.context(operation, &host.config);
    let entity = find_entity(host, &entity_type, id, &ctx)?;
    write_entity(host, &entity_type, entity, payload, &ctx)
}

fn destroy_resource<S: Store>(
    host: &ApiHost<S>,
    resource: &str,
    id: &str,
    request: &ApiRequest,
) -> ApiResult<Envelope> {
    let entity_type = host.entity_type(resource)?;
    let ctx = request.context(Operation::Destroy, &host.config);
    let mut entity = find_entity(host, &entity_type, id, &ctx)?;
    let persistence = host.persistence();

    let errors = persistence.validate_read(&mut entity, Operation::Destroy, &ctx)?;
    if !errors.is_empty() {
        return Err(ApiError::Validation { errors });
    }

    let outcome = persistence.destroy(&mut entity, Operation::Destroy)?;
    if !outcome.is_success() {
        return Ok(Envelope::new(outcome.status).with_errors(&outcome.errors));
    }

    let show_ctx = ctx.for_operation(Operation::Show);
    let object = host
        .serializer()
        .serialize(&entity, Operation::Show, &show_ctx)?;
    Ok(Envelope::new(StatusCode::OK).with_payload(host.registry.singular_name(&entity_type)?, object))
}

/// Load one entity by its path id through the request-visible collection
fn find_entity<S: Store>(
    host: &ApiHost<S>,
    entity_type: &str,
    id: &str,
    ctx: &RequestContext,
) -> ApiResult<S::Entity> {
    let id_attribute = &host.config.id_attribute;
    let column_type = host
        .store
        .column_type(entity_type, id_attribute)
        .unwrap_or(ColumnType::Other);
    let includes = host
        .registry
        .include_paths(entity_type, ctx.operation, ctx)?;
    host.composer()
        .base_query(entity_type, ctx)?
        .filter(eq_predicate(id_attribute, column_type, &Value::String(id.to_string())))
        .include(&includes)
        .first()?
        .ok_or_else(|| ApiError::not_found(id_attribute.as_str()))
}

/// Merge, validate and persist a payload, then render the stored result
///
/// A failed save echoes the request payload under the singular root key.
fn write_entity<S: Store>(
    host: &ApiHost<S>,
    entity_type: &str,
    mut entity: S::Entity,
    payload: Map<String, Value>,
    ctx: &RequestContext,
) -> ApiResult<Envelope> {
    let operation = ctx.operation;
    let mut ignored = IgnoredFields::new();
    host.update_engine()
        .apply_updates(&mut entity, &payload, operation, ctx, &mut ignored)?;
    if let Some(hook) = &host.registry.model(entity_type)?.after_initialize {
        hook(&mut entity, ctx);
    }

    let singular = host.registry.singular_name(entity_type)?;
    let outcome = host
        .persistence()
        .save(&mut entity, operation, ctx, &SaveHooks::default())?;
    if !outcome.is_success() {
        return Ok(Envelope::new(outcome.status)
            .with_errors(&outcome.errors)
            .with_payload(singular, Value::Object(payload))
            .with_ignored_fields(&ignored));
    }

    // Reload so associations the payload did not touch are rendered too
    let show_ctx = ctx.for_operation(Operation::Show);
    let key = entity
        .field(&host.config.id_attribute)
        .filter(|key| !key.is_null())
        .map(|key| key_text(&key));
    let stored = match &key {
        Some(key) => find_entity(host, entity_type, key, &show_ctx).unwrap_or(entity),
        None => entity,
    };

    let object = host
        .serializer()
        .serialize_with_links(&stored, Operation::Show, &show_ctx)?;
    let status = if operation == Operation::Create {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut envelope = Envelope::new(status)
        .with_payload(singular, object)
        .with_ignored_fields(&ignored);
    if let (Operation::Create, Some(key)) = (operation, key) {
        let plural = host.registry.plural_name(entity_type)?;
        envelope = envelope.with_location(format!("{}/{}", host.collection_href(&plural), key));
    }
    Ok(envelope)
}
