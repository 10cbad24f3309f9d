//! Mapping between Rust field types and cell values

use crate::data::{DataType, Value};
use crate::DataError;
use chrono::{DateTime, Utc};

/// A Rust type that can live in one column.
///
/// Implemented for the integer, float, bool, string and date types, and
/// for `Option<V>`, which is the only way to make a column nullable.
/// Enumerations implement it by hand with `DataType::Enumeration` and
/// their ordinal:
///
/// ```ignore
/// impl Persistable for Rank {
///     const DATA_TYPE: DataType = DataType::Enumeration;
///
///     fn to_value(&self) -> Value {
///         Value::Enumeration(*self as i32)
///     }
///
///     fn from_value(value: &Value) -> Option<Self> {
///         match value.as_i64()? {
///             0 => Some(Rank::Member),
///             1 => Some(Rank::Admin),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Persistable: Sized + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    /// `None` when the value cannot represent `Self`.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! persistable {
    ($ty:ty, $variant:ident) => {
        impl Persistable for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value.coerce(Self::DATA_TYPE)? {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

persistable!(i32, Integer);
persistable!(i64, Long);
persistable!(i8, Byte);
persistable!(f32, Float);
persistable!(f64, Double);
persistable!(bool, Boolean);
persistable!(String, String);
persistable!(DateTime<Utc>, Date);

impl<V: Persistable> Persistable for Option<V> {
    const DATA_TYPE: DataType = V::DATA_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map(V::to_value).unwrap_or(Value::Null)
    }

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        V::from_value(value).map(Some)
    }
}

/// Convert a stored value for field `field`.
pub(crate) fn decode<V: Persistable>(field: &str, value: &Value) -> Result<V, DataError> {
    if value.is_null() && !V::NULLABLE {
        return Err(DataError::NullValue {
            field: field.to_string(),
        });
    }

    let conversion = || DataError::Conversion {
        field: field.to_string(),
        from: value.data_type(),
        to: V::DATA_TYPE,
    };
    let converted = value.coerce(V::DATA_TYPE).ok_or_else(conversion)?;
    V::from_value(&converted).ok_or_else(conversion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_coerces_store_types() {
        assert_eq!(decode::<i32>("level", &Value::Long(12)).unwrap(), 12);
        assert!(decode::<bool>("online", &Value::Long(1)).unwrap());
        assert_eq!(decode::<f32>("x", &Value::Double(1.5)).unwrap(), 1.5);
        assert_eq!(
            decode::<DateTime<Utc>>("joined", &Value::Long(60)).unwrap().timestamp(),
            60
        );
    }

    #[test]
    fn test_decode_null_handling() {
        assert_eq!(
            decode::<i32>("level", &Value::Null),
            Err(DataError::NullValue {
                field: "level".into()
            })
        );
        assert_eq!(decode::<Option<i32>>("level", &Value::Null).unwrap(), None);
        assert_eq!(decode::<Option<i32>>("level", &Value::Long(4)).unwrap(), Some(4));
    }

    #[test]
    fn test_decode_rejects_unconvertible() {
        let err = decode::<i64>("count", &Value::from("many")).unwrap_err();
        assert!(matches!(err, DataError::Conversion { to: DataType::Long, .. }));
    }

    #[test]
    fn test_option_to_value() {
        assert_eq!(Some(3i64).to_value(), Value::Long(3));
        assert_eq!(None::<String>.to_value(), Value::Null);
        assert_eq!(<Option<String>>::DATA_TYPE, DataType::String);
    }
}
