//! Stock parse/render transforms
//!
//! Non-string values pass through unchanged unless stated otherwise.

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use super::context::RequestContext;
use super::metadata::{Transform, transform};

fn map_str(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Transform {
    transform(move |value: Value, _: &RequestContext| -> Result<Value> {
        match value.as_str() {
            Some(s) => Ok(Value::String(f(s))),
            None => Ok(value),
        }
    })
}

/// Trim surrounding whitespace
pub fn trim() -> Transform {
    map_str(|s| s.trim().to_string())
}

pub fn uppercase() -> Transform {
    map_str(str::to_uppercase)
}

pub fn lowercase() -> Transform {
    map_str(str::to_lowercase)
}

/// Keep only ASCII digits, e.g. `"978-0-441"` becomes `"9780441"`
pub fn digits_only() -> Transform {
    map_str(|s| s.chars().filter(char::is_ascii_digit).collect())
}

/// Round a number (or numeric string) to `decimals` places
pub fn round_decimals(decimals: u32) -> Transform {
    transform(move |value: Value, _: &RequestContext| -> Result<Value> {
        let number = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(num) => {
                let factor = 10_f64.powi(decimals as i32);
                Ok(json!((num * factor).round() / factor))
            }
            None => Ok(value),
        }
    })
}

/// Convert numeric strings to numbers; any other string is an error
pub fn number() -> Transform {
    transform(|value: Value, _: &RequestContext| -> Result<Value> {
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(json!(i))
                } else {
                    trimmed
                        .parse::<f64>()
                        .map(|f| json!(f))
                        .map_err(|_| anyhow!("'{}' is not a number", s))
                }
            }
            other => Ok(other),
        }
    })
}
