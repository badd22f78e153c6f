//! Parameter conversion from `sea_query::Value` to `may_postgres` binds.
//!
//! Every bound value is converted into an owned, typed `ToSql` box first;
//! the driver then receives references into that storage for the duration of
//! the closure. Nulls keep the type of their variant so PostgreSQL type checks
//! on the placeholder still pass.

use crate::error::{OrmError, Result};
use may_postgres::types::ToSql;
use sea_query::{Value, ValueType};

/// Convert `values` and run `f` with the resulting driver parameters.
///
/// # Errors
///
/// Returns [`OrmError::Query`] for variants that have no PostgreSQL bind
/// (e.g. a `BigUnsigned` beyond `i64::MAX`), or whatever `f` returns.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R>,
{
    let owned = values
        .iter()
        .map(to_sql_box)
        .collect::<Result<Vec<Box<dyn ToSql>>>>()?;
    let params: Vec<&dyn ToSql> = owned.iter().map(|b| b.as_ref()).collect();
    f(&params)
}

fn to_sql_box(value: &Value) -> Result<Box<dyn ToSql>> {
    let boxed: Box<dyn ToSql> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = v
                .map(|u| {
                    <i64 as TryFrom<u64>>::try_from(u).map_err(|_| {
                        OrmError::Query(format!(
                            "BigUnsigned value {} exceeds i64::MAX ({}), cannot be bound",
                            u,
                            i64::MAX
                        ))
                    })
                })
                .transpose()?;
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.clone()),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.clone()),
        Value::Json(_) => typed::<serde_json::Value>(value)?,
        Value::Uuid(_) => typed::<uuid::Uuid>(value)?,
        Value::ChronoDate(_) => typed::<chrono::NaiveDate>(value)?,
        Value::ChronoTime(_) => typed::<chrono::NaiveTime>(value)?,
        Value::ChronoDateTime(_) => typed::<chrono::NaiveDateTime>(value)?,
        Value::ChronoDateTimeUtc(_) => typed::<chrono::DateTime<chrono::Utc>>(value)?,
        Value::Decimal(_) => typed::<rust_decimal::Decimal>(value)?,
        other => {
            return Err(OrmError::Query(format!(
                "Unsupported value type in query: {:?}",
                other
            )))
        }
    };
    Ok(boxed)
}

/// Unwrap a non-scalar variant into its `Option<T>` payload
fn typed<T>(value: &Value) -> Result<Box<dyn ToSql>>
where
    Option<T>: ValueType + ToSql + 'static,
{
    let payload = <Option<T> as ValueType>::try_from(value.clone())
        .map_err(|e| OrmError::Query(format!("Cannot bind {:?}: {:?}", value, e)))?;
    Ok(Box::new(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::Values;

    #[test]
    fn test_converts_every_bound_value() {
        let values = Values(vec![
            Value::from(1i32),
            Value::from("Ada"),
            Value::String(None),
            Value::from(true),
            Value::from(uuid::Uuid::nil()),
        ]);
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_rejects_oversized_unsigned() {
        let values = Values(vec![Value::BigUnsigned(Some(u64::MAX))]);
        let err = with_converted_params(&values, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("exceeds i64::MAX"));
    }

    #[test]
    fn test_closure_error_propagates() {
        let values = Values(vec![]);
        let err = with_converted_params::<_, ()>(&values, |_| Err(OrmError::Query("boom".into())))
            .unwrap_err();
        assert!(matches!(err, OrmError::Query(ref m) if m == "boom"));
    }
}
