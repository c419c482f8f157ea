//! The universal payload type for parameters, connections, and scenario
//! actions.

use std::fmt;

use crate::error::{Error, Result};

/// Discriminant of a [`Value`], also used to declare connection and variable
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Real,
    Bool,
    String,
}

impl ValueType {
    /// Short marker used to suffix recorded column names, e.g. `x[REAL]`.
    pub fn marker(self) -> &'static str {
        match self {
            ValueType::Integer => "INT",
            ValueType::Real => "REAL",
            ValueType::Bool => "BOOL",
            ValueType::String => "STR",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "int",
            ValueType::Real => "real",
            ValueType::Bool => "bool",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

/// A dynamically typed scalar: the payload exchanged with model instances.
///
/// # Examples
///
/// ```
/// use cosim::Value;
///
/// let v = Value::from(1.5);
/// assert_eq!(v.as_real(), Some(1.5));
/// assert_eq!(v.as_integer(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Real(f64),
    Bool(bool),
    String(String),
}

impl Value {
    /// Returns the type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a TOML value from a scenario or recorder file.
    ///
    /// TOML distinguishes booleans, integers, floats, and strings natively,
    /// so each maps onto exactly one variant. Any other TOML type is
    /// rejected.
    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::Boolean(v) => Ok(Value::Bool(*v)),
            toml::Value::Integer(v) => {
                let v = i32::try_from(*v).map_err(|_| {
                    Error::InvalidConfig(format!("integer value {v} out of range for int"))
                })?;
                Ok(Value::Integer(v))
            }
            toml::Value::Float(v) => Ok(Value::Real(*v)),
            toml::Value::String(v) => Ok(Value::String(v.clone())),
            other => Err(Error::InvalidConfig(format!(
                "unsupported value type '{}', expected bool, integer, float, or string",
                other.type_str()
            ))),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_conversions_pick_the_matching_variant() {
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
        assert_eq!(Value::from(1).value_type(), ValueType::Integer);
        assert_eq!(Value::from(1.0).value_type(), ValueType::Real);
        assert_eq!(Value::from("on").value_type(), ValueType::String);
    }

    #[test]
    fn typed_accessors_reject_other_variants() {
        let v = Value::Integer(3);
        assert_eq!(v.as_integer(), Some(3));
        assert_eq!(v.as_real(), None);
        assert_eq!(v.as_bool(), None);
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn from_toml_maps_each_native_type() {
        let doc: toml::Value = "b = true\ni = 7\nr = 2.5\ns = 'idle'".parse().unwrap();
        let table = doc.as_table().unwrap();
        assert_eq!(Value::from_toml(&table["b"]).unwrap(), Value::Bool(true));
        assert_eq!(Value::from_toml(&table["i"]).unwrap(), Value::Integer(7));
        assert_eq!(Value::from_toml(&table["r"]).unwrap(), Value::Real(2.5));
        assert_eq!(
            Value::from_toml(&table["s"]).unwrap(),
            Value::String("idle".into())
        );
    }

    #[test]
    fn from_toml_rejects_arrays() {
        let doc: toml::Value = "a = [1, 2]".parse().unwrap();
        let err = Value::from_toml(&doc.as_table().unwrap()["a"]).unwrap_err();
        assert!(err.to_string().contains("unsupported value type"));
    }

    #[test]
    fn markers_match_recorded_column_suffixes() {
        assert_eq!(ValueType::Real.marker(), "REAL");
        assert_eq!(ValueType::Integer.marker(), "INT");
        assert_eq!(ValueType::Bool.marker(), "BOOL");
        assert_eq!(ValueType::String.marker(), "STR");
    }
}
