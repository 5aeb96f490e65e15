//! Response envelope
//!
//! Every REST response, successful or not, has the same outer shape:
//!
//! ```json
//! {
//!   "successful": true,
//!   "status": "ok",
//!   "statusCode": 200,
//!   "books": [ ... ],
//!   "count": 95, "page": 2, "pageCount": 5, "pageSize": 20,
//!   "_links": [ { "rel": "next", "href": "/books?page=3&page_size=20" } ],
//!   "ignoredFields": [ { "bogus": "x" } ]
//! }
//! ```
//!
//! Failures carry `errors`; a failed write also echoes the request payload.

use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use convert_case::{Case, Casing};
use serde_json::{Map, Value, json};

use crate::core::context::IgnoredFields;
use crate::core::error::{ApiError, ErrorEntry};
use crate::core::query::{Link, Pagination};

/// Header carrying the unpaged size of a collection
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

const INTERNAL_ERROR: &str = "Internal server error";

/// Snake-cased reason phrase (`ok`, `bad_request`, `not_found`)
pub fn status_name(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason.to_case(Case::Snake),
        None => status.as_u16().to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    status: StatusCode,
    body: Map<String, Value>,
    total_count: Option<usize>,
    location: Option<String>,
}

impl Envelope {
    pub fn new(status: StatusCode) -> Self {
        let mut body = Map::new();
        body.insert("successful".to_string(), Value::Bool(status.is_success()));
        body.insert("status".to_string(), Value::String(status_name(status)));
        body.insert("statusCode".to_string(), Value::from(status.as_u16()));
        Self {
            status,
            body,
            total_count: None,
            location: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn with_errors(mut self, errors: &[ErrorEntry]) -> Self {
        if !errors.is_empty() {
            self.body.insert("errors".to_string(), json!(errors));
        }
        self
    }

    /// The primary payload under its root key
    pub fn with_payload(mut self, root: impl Into<String>, payload: Value) -> Self {
        self.body.insert(root.into(), payload);
        self
    }

    pub fn with_pagination(mut self, pagination: &Pagination) -> Self {
        if let Value::Object(fields) = json!(pagination) {
            self.body.extend(fields);
        }
        self.total_count = Some(pagination.count);
        self
    }

    pub fn with_links(mut self, links: &[Link]) -> Self {
        if !links.is_empty() {
            self.body.insert("_links".to_string(), json!(links));
        }
        self
    }

    pub fn with_ignored_fields(mut self, ignored: &IgnoredFields) -> Self {
        if !ignored.is_empty() {
            self.body
                .insert("ignoredFields".to_string(), ignored.to_value());
        }
        self
    }

    pub fn with_location(mut self, href: impl Into<String>) -> Self {
        self.location = Some(href.into());
        self
    }

    /// Render a boundary error
    ///
    /// Unhandled errors render their event id; the detail is only included
    /// when `expose_details` is set.
    pub fn from_error(err: &ApiError, expose_details: bool) -> Self {
        let envelope = Self::new(err.status_code());
        match err {
            ApiError::Unhandled { error_id, detail } => {
                let mut entry = json!({
                    "error": INTERNAL_ERROR,
                    "message": format!(
                        "An internal error occurred processing the request (error id {})",
                        error_id
                    ),
                    "errorId": error_id.to_string(),
                });
                if expose_details {
                    entry["detail"] = Value::String(detail.clone());
                }
                let mut envelope = envelope;
                envelope
                    .body
                    .insert("errors".to_string(), Value::Array(vec![entry]));
                envelope
            }
            other => envelope.with_errors(&other.entries()),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(Value::Object(self.body))).into_response();
        let headers = response.headers_mut();
        if let Some(count) = self.total_count {
            headers.insert(
                HeaderName::from_static(TOTAL_COUNT_HEADER),
                HeaderValue::from(count),
            );
        }
        if let Some(location) = self.location {
            match HeaderValue::from_str(&location) {
                Ok(value) => {
                    headers.insert(header::LOCATION, value);
                }
                Err(_) => tracing::warn!(location = %location, "location is not a valid header value"),
            }
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Envelope::from_error(&self, false).into_response()
    }
}
