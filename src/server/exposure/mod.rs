//! API exposure modules
//!
//! Each exposure consumes an `ApiHost` and produces a router for its protocol.

pub mod rest;

pub use rest::RestExposure;
