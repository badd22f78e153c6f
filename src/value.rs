//! Typed extraction from `sea_query::Value` and identity-key coercion.
//!
//! Attribute values travel through the crate as `sea_query::Value`. The identity
//! map compares identities as strings, so every key-like value is coerced with
//! [`value_key`] before it is used for lookup or edge recording.

use sea_query::Value;

/// Error type for value extraction failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExtractionError {
    /// The value is null (None variant)
    NullValue,
    /// The value type doesn't match the expected type
    TypeMismatch { expected: String, actual: String },
    /// Value conversion failed (e.g., overflow, invalid format)
    ConversionError(String),
}

impl std::fmt::Display for ValueExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueExtractionError::NullValue => write!(f, "Value is null"),
            ValueExtractionError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, actual)
            }
            ValueExtractionError::ConversionError(msg) => {
                write!(f, "Conversion error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValueExtractionError {}

/// Trait for safe value extraction with error handling
///
/// Returns `Result<T, ValueExtractionError>` so callers can tell a null
/// attribute apart from a type mismatch.
///
/// ```rust
/// use tidemark::value::{TryGetable, ValueExtractionError};
/// use sea_query::Value;
///
/// let value = Value::Int(Some(42));
/// assert_eq!(i32::try_get(value), Ok(42));
///
/// let null_value = Value::Int(None);
/// assert!(matches!(i32::try_get(null_value), Err(ValueExtractionError::NullValue)));
/// ```
pub trait TryGetable: Sized {
    /// Extract a non-null value of this type
    fn try_get(value: Value) -> Result<Self, ValueExtractionError>;

    /// Extract a value, mapping null to `None`
    fn try_get_opt(value: Value) -> Result<Option<Self>, ValueExtractionError> {
        match Self::try_get(value) {
            Ok(v) => Ok(Some(v)),
            Err(ValueExtractionError::NullValue) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

macro_rules! impl_try_getable {
    ($type:ty, $variant:ident, $expected:expr) => {
        impl TryGetable for $type {
            fn try_get(value: Value) -> Result<Self, ValueExtractionError> {
                match value {
                    Value::$variant(Some(v)) => Ok(v),
                    Value::$variant(None) => Err(ValueExtractionError::NullValue),
                    _ => Err(ValueExtractionError::TypeMismatch {
                        expected: $expected.to_string(),
                        actual: format!("{:?}", value),
                    }),
                }
            }
        }
    };
}

impl_try_getable!(i8, TinyInt, "TinyInt");
impl_try_getable!(i16, SmallInt, "SmallInt");
impl_try_getable!(f32, Float, "Float");
impl_try_getable!(bool, Bool, "Bool");
impl_try_getable!(String, String, "String");
impl_try_getable!(Vec<u8>, Bytes, "Bytes");

// Integer columns widen: an INT4 attribute can be read as i64 and vice versa when it fits.
impl TryGetable for i32 {
    fn try_get(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Int(Some(v)) => Ok(v),
            Value::SmallInt(Some(v)) => Ok(i32::from(v)),
            Value::TinyInt(Some(v)) => Ok(i32::from(v)),
            Value::BigInt(Some(v)) => i32::try_from(v).map_err(|_| {
                ValueExtractionError::ConversionError(format!("{} does not fit in i32", v))
            }),
            v if is_null(&v) => Err(ValueExtractionError::NullValue),
            v => Err(ValueExtractionError::TypeMismatch {
                expected: "Int".to_string(),
                actual: format!("{:?}", v),
            }),
        }
    }
}

impl TryGetable for i64 {
    fn try_get(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::BigInt(Some(v)) => Ok(v),
            Value::Int(Some(v)) => Ok(i64::from(v)),
            Value::SmallInt(Some(v)) => Ok(i64::from(v)),
            Value::TinyInt(Some(v)) => Ok(i64::from(v)),
            Value::Unsigned(Some(v)) => Ok(i64::from(v)),
            Value::BigUnsigned(Some(v)) => i64::try_from(v).map_err(|_| {
                ValueExtractionError::ConversionError(format!("{} exceeds i64::MAX", v))
            }),
            v if is_null(&v) => Err(ValueExtractionError::NullValue),
            v => Err(ValueExtractionError::TypeMismatch {
                expected: "BigInt".to_string(),
                actual: format!("{:?}", v),
            }),
        }
    }
}

impl TryGetable for f64 {
    fn try_get(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Double(Some(v)) => Ok(v),
            Value::Float(Some(v)) => Ok(f64::from(v)),
            v if is_null(&v) => Err(ValueExtractionError::NullValue),
            v => Err(ValueExtractionError::TypeMismatch {
                expected: "Double".to_string(),
                actual: format!("{:?}", v),
            }),
        }
    }
}

impl TryGetable for serde_json::Value {
    fn try_get(value: Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Json(Some(j)) => Ok((*j).clone()),
            Value::Json(None) => Err(ValueExtractionError::NullValue),
            v => Err(ValueExtractionError::TypeMismatch {
                expected: "Json".to_string(),
                actual: format!("{:?}", v),
            }),
        }
    }
}

/// Whether the value is SQL NULL, whatever its declared type
pub fn is_null(value: &Value) -> bool {
    *value == value.as_null()
}

/// Coerce a key-like value to the string form the identity map compares on.
///
/// Returns `None` for NULL (of any type): a null key never identifies anything.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::Bool(Some(b)) => Some(b.to_string()),
        Value::TinyInt(Some(i)) => Some(i.to_string()),
        Value::SmallInt(Some(i)) => Some(i.to_string()),
        Value::Int(Some(i)) => Some(i.to_string()),
        Value::BigInt(Some(i)) => Some(i.to_string()),
        Value::TinyUnsigned(Some(u)) => Some(u.to_string()),
        Value::SmallUnsigned(Some(u)) => Some(u.to_string()),
        Value::Unsigned(Some(u)) => Some(u.to_string()),
        Value::BigUnsigned(Some(u)) => Some(u.to_string()),
        Value::Float(Some(f)) => Some(f.to_string()),
        Value::Double(Some(d)) => Some(d.to_string()),
        Value::String(Some(s)) => Some(s.to_string()),
        Value::Char(Some(c)) => Some(c.to_string()),
        Value::Json(Some(j)) => Some(j.to_string()),
        Value::Uuid(Some(u)) => Some(u.to_string()),
        Value::Decimal(Some(d)) => Some(d.to_string()),
        Value::ChronoDate(Some(d)) => Some(d.to_string()),
        Value::ChronoDateTime(Some(d)) => Some(d.to_string()),
        Value::ChronoDateTimeUtc(Some(d)) => Some(d.to_rfc3339()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_key_integers_and_strings() {
        assert_eq!(value_key(&Value::Int(Some(42))), Some("42".to_string()));
        assert_eq!(value_key(&Value::BigInt(Some(42))), Some("42".to_string()));
        assert_eq!(
            value_key(&Value::String(Some("abc".to_string()))),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_value_key_null_is_none() {
        assert_eq!(value_key(&Value::Int(None)), None);
        assert_eq!(value_key(&Value::String(None)), None);
        assert!(is_null(&Value::BigInt(None)));
        assert!(!is_null(&Value::BigInt(Some(0))));
    }

    #[test]
    fn test_value_key_uuid() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(value_key(&Value::from(id)), Some(id.to_string()));
    }

    #[test]
    fn test_try_get_widening() {
        assert_eq!(i64::try_get(Value::Int(Some(7))), Ok(7));
        assert_eq!(i32::try_get(Value::BigInt(Some(7))), Ok(7));
        assert!(matches!(
            i32::try_get(Value::BigInt(Some(i64::MAX))),
            Err(ValueExtractionError::ConversionError(_))
        ));
    }

    #[test]
    fn test_try_get_mismatch_and_null() {
        assert!(matches!(
            bool::try_get(Value::Int(Some(1))),
            Err(ValueExtractionError::TypeMismatch { .. })
        ));
        assert_eq!(String::try_get_opt(Value::String(None)), Ok(None));
        assert_eq!(
            String::try_get_opt(Value::String(Some("x".to_string()))),
            Ok(Some("x".to_string()))
        );
    }
}
