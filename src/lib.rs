//! # Model API
//!
//! A metadata-driven REST engine: declare once which attributes an entity
//! exposes and how each behaves, and get query-string filtering and sorting,
//! nested payload merging, validation-aware persistence and serialization
//! with hypermedia links and pagination.
//!
//! ## Features
//!
//! - **Attribute metadata**: aliases, visibility per operation, admin gating,
//!   parse/render transforms, setters and exception policies
//! - **Filter and sort parsing**: operator-prefixed and delimited filter
//!   values, JSON or `key_desc` sort strings, association-qualified keys
//! - **Nested writes**: to-one and to-many payloads matched by id attributes
//!   or created, with path-qualified errors (`items[1].name`)
//! - **Store-agnostic**: the engine runs against the [`Store`](core::Store)
//!   trait; an in-memory store is included
//! - **REST exposure**: one set of axum routes serves every registered type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use model_api::prelude::*;
//!
//! let schema = Schema::new().table(
//!     TableSchema::new("book")
//!         .column(ColumnDef::new("title", ColumnType::Other).required())
//!         .column(ColumnDef::new("price", ColumnType::Decimal)),
//! );
//!
//! let registry = Registry::builder()
//!     .attributes("book", vec![
//!         AttributeMetadata::new("id").id().read_only().filterable().sortable(),
//!         AttributeMetadata::new("title").filterable().sortable(),
//!         AttributeMetadata::new("price").filterable().sortable(),
//!     ])
//!     .build()?;
//!
//! ApiBuilder::new()
//!     .with_store(InMemoryStore::new(schema))
//!     .with_registry(registry)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Metadata ===
    pub use crate::core::{
        AssociationInfo, AttributeMetadata, ErrorMatcher, ExceptionHandler, Flag, ModelMetadata,
        Registry, RegistryBuilder, Selector, ValueSource, hook, transform,
    };

    // === Engine ===
    pub use crate::core::{
        IgnoredFields, Persistence, QueryComposer, RequestContext, SaveHooks, SaveOutcome,
        Serializer, UpdateEngine,
    };

    // === Core Traits ===
    pub use crate::core::{Entity, EntityGraph, Query, Store};

    // === Values and errors ===
    pub use crate::core::{
        ApiError, ColumnType, ErrorEntry, FieldValue, Operation, SortDirection, ValidationErrors,
    };

    // === Auth ===
    pub use crate::core::{AuthContext, AuthProvider, HeaderAuthProvider, NoAuthProvider};

    // === Storage ===
    pub use crate::storage::{ColumnDef, InMemoryStore, Record, Schema, TableSchema};

    // === Config ===
    pub use crate::config::ApiConfig;

    // === Server ===
    pub use crate::server::{ApiBuilder, ApiHost, Envelope};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use serde_json::{Value, json};
}
