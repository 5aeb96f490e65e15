//! Axum extractors for engine requests
//!
//! - [`ApiRequest`]: the authenticated caller plus decoded query parameters
//! - [`JsonObject`]: a request body that must be a JSON object

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::host::ApiHost;
use crate::config::ApiConfig;
use crate::core::auth::AuthContext;
use crate::core::context::RequestContext;
use crate::core::error::ApiError;
use crate::core::field::parse_bool;
use crate::core::filter::FilterParams;
use crate::core::operation::Operation;
use crate::core::query::PageRequest;
use crate::core::sort::{self, SortKey};
use crate::core::store::Store;

/// The caller and query string of a request
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub auth: AuthContext,
    pub params: Vec<(String, String)>,
    raw_query: Option<String>,
}

impl ApiRequest {
    pub fn new(auth: AuthContext, params: Vec<(String, String)>) -> Self {
        Self {
            auth,
            params,
            raw_query: None,
        }
    }

    /// Last value given for a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A boolean flag; a bare `?admin` counts as set
    pub fn flag(&self, name: &str) -> bool {
        match self.param(name) {
            Some(value) if value.trim().is_empty() => true,
            Some(value) => parse_bool(value).unwrap_or(false),
            None => false,
        }
    }

    /// Request context acted by the caller
    pub fn context(&self, operation: Operation, config: &ApiConfig) -> RequestContext {
        self.auth
            .request_context(operation, self.flag(&config.admin_param))
    }

    /// Every parameter that is not a control parameter
    pub fn filter_params(&self, config: &ApiConfig) -> FilterParams {
        FilterParams::from_query_pairs(self.params.iter().cloned(), &config.control_params())
    }

    pub fn sort_keys(&self, config: &ApiConfig) -> Vec<SortKey> {
        self.param(&config.sort_param)
            .map(sort::parse)
            .unwrap_or_default()
    }

    pub fn page_request(&self, config: &ApiConfig) -> Result<PageRequest, ApiError> {
        let page = self.number(&config.page_param)?;
        let page_size = self.number(&config.page_size_param)?;
        Ok(PageRequest::new(page, page_size, config.default_page_size).capped(config.max_page_size))
    }

    fn number(&self, name: &str) -> Result<Option<usize>, ApiError> {
        match self.param(name).map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<usize>()
                .map(Some)
                .map_err(|_| ApiError::bad_request(format!("{} must be a positive integer", name))),
        }
    }

    /// `base` followed by the original query string minus the `dropped` keys
    pub fn href(&self, base: &str, dropped: &[&str]) -> String {
        let kept: Vec<&str> = self
            .raw_query
            .as_deref()
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
                !dropped.contains(&key)
            })
            .collect();
        if kept.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, kept.join("&"))
        }
    }
}

impl<S: Store + 'static> FromRequestParts<Arc<ApiHost<S>>> for ApiRequest {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        host: &Arc<ApiHost<S>>,
    ) -> Result<Self, Self::Rejection> {
        let auth = host.auth.authenticate(&parts.headers)?;
        let Query(params) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(Self {
            auth,
            params,
            raw_query: parts.uri.query().map(str::to_string),
        })
    }
}

/// A request body decoded as a JSON object
///
/// An empty body, malformed JSON or a non-object document is rejected with
/// the bad-payload envelope.
#[derive(Debug, Clone)]
pub struct JsonObject(pub Map<String, Value>);

impl JsonObject {
    pub fn parse(bytes: &[u8]) -> Result<Self, ApiError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::bad_payload());
        }
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(object) => Ok(Self(object)),
            Value::Array(_) => Err(ApiError::BadPayload {
                message: "Expected object, but collection provided".to_string(),
            }),
            _ => Err(ApiError::BadPayload {
                message: "Expected object".to_string(),
            }),
        }
    }
}

impl<S: Send + Sync> FromRequest<S> for JsonObject {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ApiError::bad_payload())?;
        Self::parse(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> ApiRequest {
        let params = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiRequest {
            auth: AuthContext::Anonymous,
            params,
            raw_query: Some(query.to_string()),
        }
    }

    // === query parameters ===

    #[test]
    fn test_control_params_are_not_filters() {
        let config = ApiConfig::default();
        let req = request("title=Dune&sort_by=price_desc&page=2&admin=1&access_token=t");
        let filters = req.filter_params(&config);
        let keys: Vec<&str> = filters.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["title"]);
        assert_eq!(req.sort_keys(&config).len(), 1);
        assert!(req.flag("admin"));
    }

    #[test]
    fn test_page_request() {
        let config = ApiConfig {
            max_page_size: Some(50),
            ..ApiConfig::default()
        };
        let page = request("page=3&page_size=500").page_request(&config).unwrap();
        assert_eq!(page.page, 3);
        assert_eq!(page.page_size, 50);

        let err = request("page=two").page_request(&config).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_href_drops_paging_params() {
        let req = request("title=Dune&page=2&page_size=10");
        assert_eq!(
            req.href("/books", &["page", "page_size"]),
            "/books?title=Dune"
        );
        assert_eq!(request("").href("/books", &["page"]), "/books");
    }

    #[test]
    fn test_admin_content_needs_admin_actor() {
        let config = ApiConfig::default();
        let anonymous = request("admin=true").context(Operation::Show, &config);
        assert!(!anonymous.admin_content);
    }

    // === body ===

    #[test]
    fn test_json_object_parse() {
        assert!(JsonObject::parse(br#"{"title":"Dune"}"#).is_ok());
        assert!(matches!(
            JsonObject::parse(b"[1]").unwrap_err(),
            ApiError::BadPayload { .. }
        ));
        assert!(matches!(
            JsonObject::parse(b"  ").unwrap_err(),
            ApiError::BadPayload { .. }
        ));
        assert!(matches!(
            JsonObject::parse(b"{oops").unwrap_err(),
            ApiError::BadPayload { .. }
        ));
    }
}
