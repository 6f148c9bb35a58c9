use serde::{Deserialize, Serialize};

use crate::value::{DataType, Value};

/// Which side of a node a value port lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSide {
  Input,
  Output,
}

impl std::fmt::Display for PortSide {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PortSide::Input => f.write_str("input"),
      PortSide::Output => f.write_str("output"),
    }
  }
}

/// A typed value port.
///
/// For a variable-size port, `data_type` is the element type; the port
/// expands into one slot per element on each node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePort {
  pub name: String,
  pub data_type: DataType,

  /// An upstream change makes the owning node a dispatch target.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub reactive: bool,

  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub variable_size: bool,

  /// Value read when the port is unconnected. Falls back to the type default.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
}

impl NodePort {
  pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
    Self {
      name: name.into(),
      data_type,
      reactive: false,
      variable_size: false,
      default: None,
    }
  }

  pub fn reactive(mut self) -> Self {
    self.reactive = true;
    self
  }

  pub fn variable(mut self) -> Self {
    self.variable_size = true;
    self
  }

  pub fn with_default(mut self, value: impl Into<Value>) -> Self {
    self.default = Some(value.into());
    self
  }

  /// The value an unconnected slot of this port reads.
  pub fn static_default(&self) -> Value {
    self
      .default
      .clone()
      .unwrap_or_else(|| self.data_type.default_value())
  }
}
