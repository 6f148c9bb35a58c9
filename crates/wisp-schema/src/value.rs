//! Port data types and the runtime value union.
//!
//! Every value port carries a [`DataType`]; every value moving along a value
//! edge or stored in node memory is a [`Value`]. Variable-size port tails
//! store their elements as a homogeneous [`Value::Array`].
//!
//! # Conversions
//! - Assignable: identical types, anything into [`DataType::Any`], arrays
//!   element-wise. Assignable edges connect directly.
//! - Implicit casts: `Int -> Float`, `Enum -> Int`, `Enum -> Float`. These
//!   connect through a cast adapter node.
//! - Text: every value renders to text. Any edge into a `Text` port can
//!   connect through a stringify adapter node.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Data type of a value port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
  Any,
  Bool,
  Int,
  Float,
  Text,
  /// A named enumeration; values are carried as ordinals.
  Enum(String),
  Array(Box<DataType>),
}

impl DataType {
  /// Convenience constructor for `Array(element)`.
  pub fn array_of(element: DataType) -> Self {
    Self::Array(Box::new(element))
  }

  /// The type-correct default value.
  pub fn default_value(&self) -> Value {
    match self {
      DataType::Any => Value::None,
      DataType::Bool => Value::Bool(false),
      DataType::Int => Value::Int(0),
      DataType::Float => Value::Float(0.0),
      DataType::Text => Value::Text(String::new()),
      DataType::Enum(_) => Value::Enum(0),
      DataType::Array(_) => Value::Array(Vec::new()),
    }
  }

  /// Whether a value of this type may flow into a port of `target` unmodified.
  pub fn is_assignable_to(&self, target: &DataType) -> bool {
    match (self, target) {
      (_, DataType::Any) => true,
      (DataType::Array(from), DataType::Array(to)) => from.is_assignable_to(to),
      (from, to) => from == to,
    }
  }

  /// Whether a native implicit conversion exists from this type to `target`.
  pub fn implicitly_casts_to(&self, target: &DataType) -> bool {
    matches!(
      (self, target),
      (DataType::Int, DataType::Float)
        | (DataType::Enum(_), DataType::Int)
        | (DataType::Enum(_), DataType::Float)
    )
  }

  pub fn is_numeric(&self) -> bool {
    matches!(self, DataType::Int | DataType::Float)
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DataType::Any => f.write_str("any"),
      DataType::Bool => f.write_str("bool"),
      DataType::Int => f.write_str("int"),
      DataType::Float => f.write_str("float"),
      DataType::Text => f.write_str("text"),
      DataType::Enum(name) => write!(f, "enum:{}", name),
      DataType::Array(element) => write!(f, "array<{}>", element),
    }
  }
}

/// A runtime value.
///
/// Serialized untagged so external JSON (`1.5`, `"hi"`, `[1, 2]`) maps
/// directly. Enum ordinals serialize as plain integers and therefore
/// deserialize as [`Value::Int`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  None,
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
  Array(Vec<Value>),
  Enum(i64),
}

impl Value {
  /// The data type this value naturally belongs to.
  ///
  /// Arrays report the type of their first element, or `Any` when empty.
  pub fn data_type(&self) -> DataType {
    match self {
      Value::None => DataType::Any,
      Value::Bool(_) => DataType::Bool,
      Value::Int(_) => DataType::Int,
      Value::Float(_) => DataType::Float,
      Value::Text(_) => DataType::Text,
      Value::Enum(_) => DataType::Enum(String::new()),
      Value::Array(items) => DataType::array_of(
        items
          .first()
          .map(Value::data_type)
          .unwrap_or(DataType::Any),
      ),
    }
  }

  pub fn is_none(&self) -> bool {
    matches!(self, Value::None)
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(i) | Value::Enum(i) => Some(*i),
      _ => None,
    }
  }

  /// Numeric view; integers widen to floats.
  pub fn as_float(&self) -> Option<f64> {
    match self {
      Value::Float(f) => Some(*f),
      Value::Int(i) | Value::Enum(i) => Some(*i as f64),
      _ => None,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Value::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&[Value]> {
    match self {
      Value::Array(items) => Some(items),
      _ => None,
    }
  }

  /// Convert this value for a port of type `target`.
  ///
  /// Succeeds for assignable values, implicit casts and stringification.
  /// Returns `None` when no conversion exists.
  pub fn cast_to(&self, target: &DataType) -> Option<Value> {
    match (self, target) {
      (_, DataType::Any) => Some(self.clone()),
      (Value::None, _) => Some(target.default_value()),
      (Value::Bool(_), DataType::Bool)
      | (Value::Int(_), DataType::Int)
      | (Value::Float(_), DataType::Float)
      | (Value::Text(_), DataType::Text)
      | (Value::Enum(_), DataType::Enum(_)) => Some(self.clone()),
      (Value::Int(i), DataType::Float) => Some(Value::Float(*i as f64)),
      (Value::Enum(i), DataType::Int) => Some(Value::Int(*i)),
      (Value::Enum(i), DataType::Float) => Some(Value::Float(*i as f64)),
      (Value::Array(items), DataType::Array(element)) => items
        .iter()
        .map(|item| item.cast_to(element))
        .collect::<Option<Vec<_>>>()
        .map(Value::Array),
      (_, DataType::Text) => Some(Value::Text(self.to_string())),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::None => f.write_str("null"),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(i) | Value::Enum(i) => write!(f, "{}", i),
      Value::Float(v) => write!(f, "{}", v),
      Value::Text(s) => f.write_str(s),
      Value::Array(items) => {
        f.write_str("[")?;
        for (index, item) in items.iter().enumerate() {
          if index > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{}", item)?;
        }
        f.write_str("]")
      }
    }
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Int(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Int(value.into())
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Text(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::Text(value)
  }
}

impl From<Vec<Value>> for Value {
  fn from(value: Vec<Value>) -> Self {
    Value::Array(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_defaults_match_type() {
    assert_eq!(DataType::Float.default_value(), Value::Float(0.0));
    assert_eq!(DataType::Text.default_value(), Value::Text(String::new()));
    assert_eq!(DataType::Any.default_value(), Value::None);
    assert_eq!(
      DataType::array_of(DataType::Int).default_value(),
      Value::Array(vec![])
    );
  }

  #[test]
  fn test_assignability() {
    assert!(DataType::Int.is_assignable_to(&DataType::Int));
    assert!(DataType::Int.is_assignable_to(&DataType::Any));
    assert!(!DataType::Int.is_assignable_to(&DataType::Float));
    assert!(!DataType::Any.is_assignable_to(&DataType::Float));
    assert!(
      DataType::array_of(DataType::Int).is_assignable_to(&DataType::array_of(DataType::Any))
    );
  }

  #[test]
  fn test_implicit_casts() {
    assert!(DataType::Int.implicitly_casts_to(&DataType::Float));
    assert!(DataType::Enum("Gesture".into()).implicitly_casts_to(&DataType::Int));
    assert!(!DataType::Float.implicitly_casts_to(&DataType::Int));
    assert!(!DataType::Bool.implicitly_casts_to(&DataType::Int));
  }

  #[test]
  fn test_cast_to() {
    assert_eq!(Value::Int(3).cast_to(&DataType::Float), Some(Value::Float(3.0)));
    assert_eq!(Value::Enum(2).cast_to(&DataType::Int), Some(Value::Int(2)));
    assert_eq!(
      Value::Float(1.5).cast_to(&DataType::Text),
      Some(Value::Text("1.5".into()))
    );
    assert_eq!(Value::Float(1.5).cast_to(&DataType::Int), None);
    assert_eq!(Value::None.cast_to(&DataType::Bool), Some(Value::Bool(false)));
  }

  #[test]
  fn test_display() {
    let value = Value::Array(vec![Value::Int(1), Value::Text("a".into()), Value::Bool(true)]);
    assert_eq!(value.to_string(), "[1, a, true]");
    assert_eq!(DataType::array_of(DataType::Float).to_string(), "array<float>");
  }

  #[test]
  fn test_untagged_json() {
    let value: Value = serde_json::from_value(json!(2.5)).unwrap();
    assert_eq!(value, Value::Float(2.5));
    let value: Value = serde_json::from_value(json!(7)).unwrap();
    assert_eq!(value, Value::Int(7));
    let value: Value = serde_json::from_value(json!(null)).unwrap();
    assert_eq!(value, Value::None);
    assert_eq!(serde_json::to_value(Value::Text("x".into())).unwrap(), json!("x"));
  }
}
