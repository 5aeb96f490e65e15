//! ApiBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ApiHost;
use crate::config::ApiConfig;
use crate::core::auth::{AuthProvider, NoAuthProvider};
use crate::core::registry::{self, Registry};
use crate::core::store::Store;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for an HTTP server over a store and a metadata registry
///
/// # Example
///
/// ```ignore
/// let app = ApiBuilder::new()
///     .with_store(InMemoryStore::new(schema))
///     .with_registry(registry)
///     .with_auth_provider(HeaderAuthProvider)
///     .build()?;
/// ```
pub struct ApiBuilder<S: Store> {
    store: Option<Arc<S>>,
    registry: Option<Arc<Registry>>,
    config: ApiConfig,
    auth: Option<Arc<dyn AuthProvider>>,
    custom_routes: Vec<Router>,
}

impl<S: Store + 'static> ApiBuilder<S> {
    pub fn new() -> Self {
        Self {
            store: None,
            registry: None,
            config: ApiConfig::default(),
            auth: None,
            custom_routes: Vec::new(),
        }
    }

    /// Set the backing store (required)
    pub fn with_store(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Use this registry instead of the process-wide one
    pub fn with_registry(mut self, registry: impl Into<Arc<Registry>>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    pub fn with_config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a YAML file
    pub fn with_config_file(mut self, path: &str) -> Result<Self> {
        self.config = ApiConfig::from_yaml_file(path)?;
        Ok(self)
    }

    /// Set how callers are identified; defaults to anonymous access
    pub fn with_auth_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(provider));
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints outside the resource pattern, such as login
    /// or webhooks:
    ///
    /// ```ignore
    /// let routes = Router::new().route("/login", post(login_handler));
    ///
    /// ApiBuilder::new()
    ///     .with_store(store)
    ///     .with_custom_routes(routes)
    ///     .build()?;
    /// ```
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    ///
    /// Without an explicit registry, the one installed with
    /// [`registry::init`] is used.
    pub fn build_host(&mut self) -> Result<ApiHost<S>> {
        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow::anyhow!("A store is required. Call .with_store()"))?;
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => registry::global()?,
        };
        let auth = self
            .auth
            .take()
            .unwrap_or_else(|| Arc::new(NoAuthProvider));
        Ok(ApiHost::new(registry, store, self.config.clone(), auth)?)
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let host = Arc::new(self.build_host()?);
        let custom_routes = std::mem::take(&mut self.custom_routes);
        tracing::info!(entity_types = ?host.entity_types(), "resource routes registered");
        RestExposure::build_router(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// Binds to `addr` and serves until SIGTERM or Ctrl+C.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl<S: Store + 'static> Default for ApiBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A signal handler that cannot be installed never fires; the other one
/// still does.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
