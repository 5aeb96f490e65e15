//! Reusable column validators
//!
//! Each validator checks one stored value and returns the message recorded
//! against the column on failure. Messages are phrased to follow the column
//! name (`price must be positive`). Values of an unexpected type pass; type
//! checking happens when the field is written.

use serde_json::Value;
use std::sync::Arc;

/// A column validator
pub type ColumnValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Number must be positive
pub fn positive() -> ColumnValidator {
    Arc::new(|value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err("must be positive".to_string()),
        _ => Ok(()),
    })
}

/// String length must be within range (in characters)
pub fn string_length(min: usize, max: usize) -> ColumnValidator {
    Arc::new(move |value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        if len < min {
            Err(format!("is too short (minimum is {} characters)", min))
        } else if len > max {
            Err(format!("is too long (maximum is {} characters)", max))
        } else {
            Ok(())
        }
    })
}

/// Number must not exceed maximum
pub fn max_value(max: f64) -> ColumnValidator {
    Arc::new(move |value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!("must be less than or equal to {}", max)),
        _ => Ok(()),
    })
}

/// Value must be in allowed list
pub fn in_list<I, S>(allowed: I) -> ColumnValidator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
    Arc::new(move |value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => {
            Err(format!("is not included in the list ({})", allowed.join(", ")))
        }
        _ => Ok(()),
    })
}

/// String must look like an email address
pub fn email() -> ColumnValidator {
    Arc::new(|value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        match s.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err("is not a valid email address".to_string()),
        }
    })
}
