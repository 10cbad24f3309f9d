//! Data types and dynamic cell values

use crate::DataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Closed set of column types understood by every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Long,
    Byte,
    Float,
    Double,
    Boolean,
    String,
    Date,
    Enumeration,
    /// Nested entity, flattened or referenced by id
    Object,
    /// External collection stored in a side table
    List,
    Null,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Byte => "byte",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Boolean => "boolean",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Enumeration => "enumeration",
            DataType::Object => "object",
            DataType::List => "list",
            DataType::Null => "null",
        }
    }

    pub fn all() -> &'static [DataType] {
        &[
            DataType::Integer,
            DataType::Long,
            DataType::Byte,
            DataType::Float,
            DataType::Double,
            DataType::Boolean,
            DataType::String,
            DataType::Date,
            DataType::Enumeration,
            DataType::Object,
            DataType::List,
            DataType::Null,
        ]
    }

    /// Whether values of this type are stored as whole numbers.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Long | DataType::Byte | DataType::Enumeration
        )
    }

    /// Types that occupy a single column.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Object | DataType::List | DataType::Null)
    }
}

impl FromStr for DataType {
    type Err = DataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(DataType::Integer),
            "long" => Ok(DataType::Long),
            "byte" => Ok(DataType::Byte),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "string" | "text" => Ok(DataType::String),
            "date" => Ok(DataType::Date),
            "enumeration" | "enum" => Ok(DataType::Enumeration),
            "object" => Ok(DataType::Object),
            "list" => Ok(DataType::List),
            "null" => Ok(DataType::Null),
            _ => Err(DataError::UnknownType(s.to_string())),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i32),
    Long(i64),
    Byte(i8),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Date(DateTime<Utc>),
    /// Enumeration ordinal
    Enumeration(i32),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::Byte(_) => DataType::Byte,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Boolean(_) => DataType::Boolean,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Enumeration(_) => DataType::Enumeration,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whole-number view of the value, if it has one.
    ///
    /// Booleans read as 0/1 and dates as epoch seconds, matching how they
    /// are written to integer columns.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::Enumeration(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Boolean(v) => Some(i64::from(*v)),
            Value::Date(v) => Some(v.timestamp()),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null | Value::Date(_) => None,
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to `to`, or `None` when the value has no representation there.
    ///
    /// `Null` converts to `Null` for every type.
    pub fn coerce(&self, to: DataType) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }
        if self.data_type() == to {
            return Some(self.clone());
        }

        match to {
            DataType::Integer => self
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Integer),
            DataType::Long => self.as_i64().map(Value::Long),
            DataType::Byte => self
                .as_i64()
                .and_then(|v| i8::try_from(v).ok())
                .map(Value::Byte),
            DataType::Enumeration => self
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Enumeration),
            DataType::Float => self.as_f64().map(|v| Value::Float(v as f32)),
            DataType::Double => self.as_f64().map(Value::Double),
            DataType::Boolean => match self {
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" => Some(Value::Boolean(true)),
                    "false" => Some(Value::Boolean(false)),
                    other => other.parse::<i64>().ok().map(|v| Value::Boolean(v != 0)),
                },
                other => other.as_i64().map(|v| Value::Boolean(v != 0)),
            },
            DataType::String => Some(Value::String(self.to_string())),
            DataType::Date => match self {
                Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|d| Value::Date(d.with_timezone(&Utc)))
                    .or_else(|| {
                        s.trim()
                            .parse::<i64>()
                            .ok()
                            .and_then(|secs| DateTime::from_timestamp(secs, 0))
                            .map(Value::Date)
                    }),
                other => other
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(Value::Date),
            },
            DataType::Object | DataType::List | DataType::Null => None,
        }
    }

    /// Hashable identity of this value when used as an id.
    pub fn cache_key(&self) -> Option<CacheKey> {
        match self {
            Value::Null => None,
            Value::Float(v) => Some(CacheKey::Bits(f64::from(*v).to_bits())),
            Value::Double(v) => Some(CacheKey::Bits(v.to_bits())),
            Value::String(s) => Some(CacheKey::Text(s.clone())),
            other => other.as_i64().map(CacheKey::Int),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(v) | Value::Enumeration(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Date(v)
    }
}

/// Cache identity of an id value.
///
/// Every integral id collapses to `Int`, so an `i32` id and the `i64` a
/// store reads back land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Int(i64),
    Text(String),
    Bits(u64),
    /// Address of a live instance, for ids that are themselves entities
    Instance(usize),
}
