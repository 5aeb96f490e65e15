//! Configuration loading and management

use anyhow::Result;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::field::parse_utc_offset;
use crate::core::naming::Naming;

fn default_page_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_time_zone() -> String {
    "-05:00".to_string()
}

fn default_sort_param() -> String {
    "sort_by".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_page_size_param() -> String {
    "page_size".to_string()
}

fn default_admin_param() -> String {
    "admin".to_string()
}

fn default_id_attribute() -> String {
    "id".to_string()
}

fn default_reserved_params() -> Vec<String> {
    vec!["access_token".to_string()]
}

/// Engine and REST exposure settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Page size used when the request does not name one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound on a requested page size
    #[serde(default)]
    pub max_page_size: Option<usize>,

    /// Lower-camel-case external attribute names
    #[serde(default = "default_true")]
    pub camel_case: bool,

    /// UTC offset for temporal filter values when the user has no zone
    #[serde(default = "default_time_zone")]
    pub default_time_zone: String,

    /// Render unhandled-error details in envelopes
    #[serde(default)]
    pub expose_error_details: bool,

    /// Path prepended to generated links
    #[serde(default)]
    pub links_prefix: String,

    #[serde(default = "default_sort_param")]
    pub sort_param: String,

    #[serde(default = "default_page_param")]
    pub page_param: String,

    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    /// Query flag requesting admin-only content
    #[serde(default = "default_admin_param")]
    pub admin_param: String,

    /// Query keys that are never filters
    #[serde(default = "default_reserved_params")]
    pub reserved_params: Vec<String>,

    /// Column matched against the `{id}` path segment
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: None,
            camel_case: true,
            default_time_zone: default_time_zone(),
            expose_error_details: false,
            links_prefix: String::new(),
            sort_param: default_sort_param(),
            page_param: default_page_param(),
            page_size_param: default_page_size_param(),
            admin_param: default_admin_param(),
            reserved_params: default_reserved_params(),
            id_attribute: default_id_attribute(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_page_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_page_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.time_zone().map(|_| ())
    }

    pub fn time_zone(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.default_time_zone).ok_or_else(|| ConfigError::InvalidValue {
            field: "default_time_zone".to_string(),
            reason: format!("'{}' is not a UTC offset", self.default_time_zone),
        })
    }

    pub fn naming(&self) -> Naming {
        Naming::new(self.camel_case)
    }

    /// Query keys that are controls rather than filters
    pub fn control_params(&self) -> Vec<String> {
        let mut params = vec![
            self.sort_param.clone(),
            self.page_param.clone(),
            self.page_size_param.clone(),
            self.admin_param.clone(),
        ];
        params.extend(self.reserved_params.iter().cloned());
        params
    }
}
