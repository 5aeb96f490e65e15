//! REST API exposure
//!
//! The REST exposure consumes an `ApiHost` and produces an Axum `Router`:
//! health routes, resource routes and any custom routes, wrapped in request
//! tracing and panic recovery.

use anyhow::Result;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use super::super::envelope::Envelope;
use super::super::host::ApiHost;
use super::super::router::build_resource_routes;
use crate::core::error::ApiError;
use crate::core::store::Store;

pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Custom routes are merged before the generic resource routes so their
    /// static paths take precedence.
    pub fn build_router<S: Store + 'static>(
        host: Arc<ApiHost<S>>,
        custom_routes: Vec<Router>,
    ) -> Result<Router> {
        let expose_details = host.config.expose_error_details;
        if host.entity_types().is_empty() {
            tracing::warn!("no entity types registered; only health routes will respond");
        }

        let mut app = Self::health_routes();
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }
        app = app.merge(build_resource_routes(host));

        Ok(app
            .layer(CatchPanicLayer::custom(move |panic| {
                Self::panic_response(panic, expose_details)
            }))
            .layer(TraceLayer::new_for_http()))
    }

    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "model-api"
        }))
    }

    /// Render a handler panic as the generic internal-error envelope
    fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_details: bool) -> Response {
        let detail = if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = panic.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "handler panicked".to_string()
        };
        Envelope::from_error(&ApiError::unhandled(detail), expose_details).into_response()
    }
}
