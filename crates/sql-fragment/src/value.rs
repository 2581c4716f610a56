use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// A single scalar value that can be bound to a placeholder.
///
/// Mirrors the shape of the scalar types a [`crate::Fragment`] can carry —
/// one variant per column type the schema model knows about, plus `Array`
/// and `Null` for the cases every dialect has to special-case anyway.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    BigInt(i128),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    Text(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Enum(String),
    Array(Vec<Value>),
    Null,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(values.into_iter().collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Value::from(v),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_round_trips_through_option() {
        let v: Value = None::<i32>.into();
        assert_eq!(v, Value::Null);
        assert!(v.is_null());
    }

    #[test]
    fn array_collects_values() {
        let v = Value::array([Value::from(1i32), Value::from(2i32)]);
        assert_eq!(v, Value::Array(vec![Value::Int32(1), Value::Int32(2)]));
    }
}
