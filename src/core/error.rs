//! Typed error handling for the model API engine
//!
//! Internal concerns each carry their own error type so callers can match on
//! them precisely; the boundary collapses everything into [`ApiError`], whose
//! variants map one-to-one onto the response taxonomy:
//!
//! - [`ApiError::NotFound`]: no access-permitted row for the requested id
//! - [`ApiError::BadPayload`]: request body missing or of the wrong shape
//! - [`ApiError::Validation`]: field-level errors from validation or hooks
//! - [`ApiError::Unhandled`]: anything else, logged and reported generically
//!
//! # Example
//!
//! ```rust,ignore
//! use model_api::prelude::*;
//!
//! let entity = query.first()?.ok_or_else(|| ApiError::not_found("id"))?;
//! ```

use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::operation::Operation;

// ============================================================================
// Error entries
// ============================================================================

/// One path-qualified field error as rendered to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// Path prefix of the nested object the error belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Fully-qualified external attribute name; absent for base errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub error: String,
    pub message: String,
}

impl ErrorEntry {
    /// Entry for an error on a named attribute
    pub fn for_attribute(object: Option<String>, attribute: String, error: String) -> Self {
        let message = format!("{} {}", attribute, error);
        Self {
            object,
            attribute: Some(attribute),
            error,
            message,
        }
    }

    /// Entry for an error on the entity as a whole
    pub fn for_base(object: Option<String>, error: String) -> Self {
        Self {
            object,
            attribute: None,
            message: error.clone(),
            error,
        }
    }

    /// The synthesized entry used when a write fails without field errors
    pub fn unspecified(operation: Operation) -> Self {
        Self {
            object: None,
            attribute: None,
            error: "Unspecified error".to_string(),
            message: format!(
                "Unspecified error processing {}: Please contact customer service for further assistance.",
                operation
            ),
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Errors in registry declarations or configuration files
///
/// These are fatal setup errors, never per-request conditions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entity type '{0}' is not registered")]
    UnknownEntityType(String),

    #[error("attribute '{attribute}' of '{entity_type}' targets unregistered type '{target}'")]
    UnknownTargetType {
        entity_type: String,
        attribute: String,
        target: String,
    },

    #[error("inheritance cycle detected at entity type '{0}'")]
    InheritanceCycle(String),

    #[error("metadata registry has not been initialized")]
    RegistryNotInitialized,

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

// ============================================================================
// Attribute Errors
// ============================================================================

/// Failures raised while writing a single attribute
///
/// These are matched against an attribute's exception policy by
/// [`AttributeErrorKind`].
#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("{0}")]
    InvalidValue(String),

    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("no writable field '{0}'")]
    NoSuchField(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Classifies an [`AttributeError`] for exception-policy matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeErrorKind {
    InvalidValue,
    TypeMismatch,
    NoSuchField,
    Other,
}

impl AttributeError {
    pub fn kind(&self) -> AttributeErrorKind {
        match self {
            AttributeError::InvalidValue(_) => AttributeErrorKind::InvalidValue,
            AttributeError::TypeMismatch { .. } => AttributeErrorKind::TypeMismatch,
            AttributeError::NoSuchField(_) => AttributeErrorKind::NoSuchField,
            AttributeError::Other(_) => AttributeErrorKind::Other,
        }
    }
}

// ============================================================================
// Store Errors
// ============================================================================

/// Faults reported by a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table for entity type '{0}'")]
    UnknownTable(String),

    #[error("unknown association '{association}' on '{entity_type}'")]
    UnknownAssociation {
        entity_type: String,
        association: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Failed(String),
}

// ============================================================================
// Query Errors
// ============================================================================

/// Failures while compiling filters and sorts into a store query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid value '{value}' for filter '{attribute}': {reason}")]
    InvalidFilterValue {
        attribute: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Merge Errors
// ============================================================================

/// Failures that escape the update/merge engine
///
/// Attribute-level failures only surface here when the attribute declares no
/// exception policy that matches them.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("unhandled error writing '{path}': {source}")]
    Unhandled {
        path: String,
        #[source]
        source: AttributeError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

// ============================================================================
// Boundary Errors
// ============================================================================

/// The error taxonomy rendered at the HTTP boundary
#[derive(Debug)]
pub enum ApiError {
    /// No matching, access-permitted row
    NotFound { field: String, message: String },

    /// Missing or malformed request body
    BadPayload { message: String },

    /// Field-level validation failures
    Validation { errors: Vec<ErrorEntry> },

    /// A client-side error in the request that is not tied to an attribute
    BadRequest { message: String },

    /// Anything unanticipated; the detail is only rendered when exposed
    Unhandled { error_id: Uuid, detail: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound { field, message } => {
                write!(f, "Not found ({}): {}", field, message)
            }
            ApiError::BadPayload { message } => write!(f, "Bad payload: {}", message),
            ApiError::Validation { errors } => {
                write!(f, "Validation failed with {} error(s)", errors.len())
            }
            ApiError::BadRequest { message } => write!(f, "Bad request: {}", message),
            ApiError::Unhandled { error_id, detail } => {
                write!(f, "Unhandled error {}: {}", error_id, detail)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub const NOT_FOUND_ERROR: &'static str = "No resource found";
    pub const NOT_FOUND_MESSAGE: &'static str =
        "No resource found at the path provided or matching the criteria specified";
    pub const BAD_PAYLOAD_ERROR: &'static str = "Missing/invalid request body (payload)";
    pub const BAD_PAYLOAD_MESSAGE: &'static str =
        "A properly-formatted JSON payload was expected in the HTTP request body but not found";

    /// Not-found error carrying the offending field name
    pub fn not_found(field: impl Into<String>) -> Self {
        ApiError::NotFound {
            field: field.into(),
            message: Self::NOT_FOUND_MESSAGE.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    pub fn bad_payload() -> Self {
        ApiError::BadPayload {
            message: Self::BAD_PAYLOAD_MESSAGE.to_string(),
        }
    }

    /// Wrap an unanticipated fault, assigning it a fresh error-event id
    pub fn unhandled(detail: impl fmt::Display) -> Self {
        let error_id = Uuid::new_v4();
        let detail = detail.to_string();
        tracing::error!(error_id = %error_id, detail = %detail, "unhandled error");
        ApiError::Unhandled { error_id, detail }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadPayload { .. } => StatusCode::BAD_REQUEST,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unhandled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::BadPayload { .. } => "BAD_PAYLOAD",
            ApiError::Validation { .. } => "VALIDATION_FAILED",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Unhandled { .. } => "INTERNAL_ERROR",
        }
    }

    /// The error list rendered in the envelope
    ///
    /// Unhandled errors carry no entries here; the boundary renders their
    /// event id (and optionally the detail) separately.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        match self {
            ApiError::NotFound { field, message } => vec![ErrorEntry {
                object: None,
                attribute: Some(field.clone()),
                error: Self::NOT_FOUND_ERROR.to_string(),
                message: message.clone(),
            }],
            ApiError::BadPayload { message } => vec![ErrorEntry {
                object: None,
                attribute: None,
                error: Self::BAD_PAYLOAD_ERROR.to_string(),
                message: message.clone(),
            }],
            ApiError::Validation { errors } => errors.clone(),
            ApiError::BadRequest { message } => {
                vec![ErrorEntry::for_base(None, message.clone())]
            }
            ApiError::Unhandled { .. } => Vec::new(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::unhandled(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::unhandled(err)
    }
}

impl From<MergeError> for ApiError {
    fn from(err: MergeError) -> Self {
        ApiError::unhandled(err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidFilterValue { .. } => ApiError::BadRequest {
                message: err.to_string(),
            },
            other => ApiError::unhandled(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(_: serde_json::Error) -> Self {
        ApiError::bad_payload()
    }
}

/// Result type for boundary operations
pub type ApiResult<T> = Result<T, ApiError>;
