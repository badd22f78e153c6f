//! Attribute casting.
//!
//! Raw row values are converted into typed attributes before an entity is
//! constructed. The caster is a collaborator: [`DefaultCaster`] covers the
//! common scalar conversions, and anything richer (embeddables, value objects)
//! plugs in through [`Cast::Custom`] or a custom [`AttributeCaster`].

use crate::error::{OrmError, Result};
use crate::value::{is_null, value_key};
use indexmap::IndexMap;
use sea_query::Value;
use std::fmt;
use std::sync::Arc;

/// Per-column cast function for [`Cast::Custom`]
pub type CastFn = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Target type of one column
#[derive(Clone)]
pub enum Cast {
    Integer,
    BigInteger,
    Float,
    Boolean,
    String,
    Json,
    Uuid,
    DateTime,
    Custom(CastFn),
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Integer => write!(f, "Integer"),
            Cast::BigInteger => write!(f, "BigInteger"),
            Cast::Float => write!(f, "Float"),
            Cast::Boolean => write!(f, "Boolean"),
            Cast::String => write!(f, "String"),
            Cast::Json => write!(f, "Json"),
            Cast::Uuid => write!(f, "Uuid"),
            Cast::DateTime => write!(f, "DateTime"),
            Cast::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Column name to cast, in declaration order
pub type CastSpec = IndexMap<String, Cast>;

/// Converts raw row attributes into typed attributes
pub trait AttributeCaster {
    fn cast(&self, raw: IndexMap<String, Value>, spec: &CastSpec) -> Result<IndexMap<String, Value>>;
}

/// Scalar caster; columns without a cast entry pass through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCaster;

impl AttributeCaster for DefaultCaster {
    fn cast(&self, raw: IndexMap<String, Value>, spec: &CastSpec) -> Result<IndexMap<String, Value>> {
        raw.into_iter()
            .map(|(column, value)| match spec.get(&column) {
                Some(cast) => {
                    let typed = cast_value(value, cast).map_err(|reason| OrmError::Cast {
                        column: column.clone(),
                        reason,
                    })?;
                    Ok((column, typed))
                }
                None => Ok((column, value)),
            })
            .collect()
    }
}

fn cast_value(value: Value, cast: &Cast) -> std::result::Result<Value, String> {
    match cast {
        Cast::Custom(f) => f(value),
        _ if is_null(&value) => Ok(null_of(cast)),
        Cast::Json if matches!(value, Value::Json(_)) => Ok(value),
        Cast::DateTime if matches!(value, Value::ChronoDateTime(_)) => Ok(value),
        _ => cast_text(&value, cast),
    }
}

fn cast_text(value: &Value, cast: &Cast) -> std::result::Result<Value, String> {
    let text = value_key(value).ok_or_else(|| format!("unsupported source value {:?}", value))?;
    match cast {
        Cast::Integer => text
            .parse::<i32>()
            .map(Value::from)
            .map_err(|e| format!("`{text}` is not an integer: {e}")),
        Cast::BigInteger => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("`{text}` is not an integer: {e}")),
        Cast::Float => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|e| format!("`{text}` is not a number: {e}")),
        Cast::Boolean => match text.as_str() {
            "true" | "t" | "1" => Ok(Value::from(true)),
            "false" | "f" | "0" => Ok(Value::from(false)),
            other => Err(format!("`{other}` is not a boolean")),
        },
        Cast::String => Ok(Value::from(text)),
        Cast::Json => serde_json::from_str::<serde_json::Value>(&text)
            .map(Value::from)
            .map_err(|e| format!("invalid JSON: {e}")),
        Cast::Uuid => uuid::Uuid::parse_str(&text)
            .map(Value::from)
            .map_err(|e| format!("invalid UUID: {e}")),
        Cast::DateTime => chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S"))
            .map(Value::from)
            .map_err(|e| format!("invalid datetime `{text}`: {e}")),
        Cast::Custom(f) => f(value.clone()),
    }
}

fn null_of(cast: &Cast) -> Value {
    match cast {
        Cast::Integer => Value::Int(None),
        Cast::BigInteger => Value::BigInt(None),
        Cast::Float => Value::Double(None),
        Cast::Boolean => Value::Bool(None),
        Cast::String => Value::String(None),
        Cast::Json => Value::Json(None),
        Cast::Uuid => Value::Uuid(None),
        Cast::DateTime => Value::ChronoDateTime(None),
        Cast::Custom(_) => Value::String(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_uncast_columns_pass_through() {
        let input = raw(&[("name", Value::from("Ada"))]);
        let out = DefaultCaster.cast(input.clone(), &CastSpec::new()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_scalar_casts() {
        let mut spec = CastSpec::new();
        spec.insert("age".to_string(), Cast::Integer);
        spec.insert("active".to_string(), Cast::Boolean);
        spec.insert("score".to_string(), Cast::Float);
        let input = raw(&[
            ("age", Value::from("42")),
            ("active", Value::from("t")),
            ("score", Value::from(3i32)),
        ]);
        let out = DefaultCaster.cast(input, &spec).unwrap();
        assert_eq!(out.get("age"), Some(&Value::Int(Some(42))));
        assert_eq!(out.get("active"), Some(&Value::Bool(Some(true))));
        assert_eq!(out.get("score"), Some(&Value::Double(Some(3.0))));
    }

    #[test]
    fn test_null_keeps_target_type() {
        let mut spec = CastSpec::new();
        spec.insert("age".to_string(), Cast::BigInteger);
        let out = DefaultCaster
            .cast(raw(&[("age", Value::String(None))]), &spec)
            .unwrap();
        assert_eq!(out.get("age"), Some(&Value::BigInt(None)));
    }

    #[test]
    fn test_failed_cast_names_column() {
        let mut spec = CastSpec::new();
        spec.insert("age".to_string(), Cast::Integer);
        let err = DefaultCaster
            .cast(raw(&[("age", Value::from("old"))]), &spec)
            .unwrap_err();
        assert!(matches!(err, OrmError::Cast { ref column, .. } if column == "age"));
    }

    #[test]
    fn test_custom_cast() {
        let mut spec = CastSpec::new();
        spec.insert(
            "email".to_string(),
            Cast::Custom(Arc::new(|v| {
                Ok(Value::from(value_key(&v).unwrap_or_default().to_lowercase()))
            })),
        );
        let out = DefaultCaster
            .cast(raw(&[("email", Value::from("ADA@EXAMPLE.COM"))]), &spec)
            .unwrap();
        assert_eq!(out.get("email"), Some(&Value::from("ada@example.com")));
    }
}
