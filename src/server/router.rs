//! Router builder for resource routes

use axum::Router;
use axum::routing::get;
use std::sync::Arc;

use super::handlers::{create, destroy, list, patch, show, update};
use super::host::ApiHost;
use crate::core::store::Store;

/// Build the generic resource routes
///
/// These routes work for every registered entity type; the `{resource}`
/// segment is the type's plural name:
/// - GET /{resource} - List with filters, sorting and paging
/// - POST /{resource} - Create
/// - GET /{resource}/{id} - Show
/// - PUT /{resource}/{id} - Update
/// - PATCH /{resource}/{id} - Partial update
/// - DELETE /{resource}/{id} - Destroy
pub fn build_resource_routes<S: Store + 'static>(host: Arc<ApiHost<S>>) -> Router {
    Router::new()
        .route("/{resource}", get(list::<S>).post(create::<S>))
        .route(
            "/{resource}/{id}",
            get(show::<S>)
                .put(update::<S>)
                .patch(patch::<S>)
                .delete(destroy::<S>),
        )
        .with_state(host)
}
