//! Server module: exposes a registry and store over HTTP
//!
//! `ApiBuilder` assembles an [`ApiHost`] and serves it through the REST
//! exposure:
//! - `GET|POST /{resource}`
//! - `GET|PUT|PATCH|DELETE /{resource}/{id}`
//! - `/health`, `/healthz`

pub mod builder;
pub mod envelope;
pub mod exposure;
pub mod extractors;
pub mod handlers;
pub mod host;
pub mod router;

pub use builder::ApiBuilder;
pub use envelope::Envelope;
pub use exposure::RestExposure;
pub use extractors::{ApiRequest, JsonObject};
pub use host::ApiHost;
