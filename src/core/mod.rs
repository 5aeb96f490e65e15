//! Core module: metadata, request processing pipeline and store contracts

pub mod auth;
pub mod compose;
pub mod context;
pub mod entity;
pub mod error;
pub mod field;
pub mod filter;
pub mod merge;
pub mod metadata;
pub mod naming;
pub mod operation;
pub mod persist;
pub mod query;
pub mod registry;
pub mod serialize;
pub mod sort;
pub mod store;
pub mod transforms;

pub use auth::{AuthContext, AuthProvider, HeaderAuthProvider, NoAuthProvider};
pub use compose::{QueryComposer, ResultFilters, ResultSorts};
pub use context::{IgnoredFields, RequestContext};
pub use entity::{Entity, EntityGraph, ValidationErrors};
pub use error::{
    ApiError, ApiResult, AttributeError, AttributeErrorKind, ConfigError, ErrorEntry, MergeError,
    QueryError, StoreError,
};
pub use field::{ColumnType, FieldValue};
pub use filter::{FilterClause, FilterParams};
pub use merge::UpdateEngine;
pub use metadata::{
    AssociationInfo, AttributeBehavior, AttributeMetadata, Cardinality, ErrorMatcher,
    ExceptionHandler, Flag, ModelMetadata, Selector, ValueSource, hook, transform,
};
pub use naming::Naming;
pub use operation::{Operation, SortDirection};
pub use persist::{Persistence, SaveHooks, SaveOutcome};
pub use query::{Link, PageRequest, Pagination};
pub use registry::{Registry, RegistryBuilder};
pub use serialize::Serializer;
pub use sort::SortKey;
pub use store::{AssociationLookup, ColumnRef, FilterOperator, Predicate, Query, Store};
