//! Schema derivation errors.

use crate::port::PortSide;

/// Errors raised while deriving a node schema. All of them are fatal for the
/// node type: no relaxed schema is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
  /// A flow node did not declare the cancellation parameter.
  #[error("flow node '{type_name}' is missing its cancellation parameter")]
  MissingCancellation { type_name: String },

  #[error("node '{type_name}' declares the cancellation parameter at position {position}, it must be first")]
  MisplacedCancellation { type_name: String, position: usize },

  /// An input parameter appears after an output parameter.
  #[error("node '{type_name}' has input '{port}' after its outputs, outputs must be trailing")]
  OutputsNotTrailing { type_name: String, port: String },

  #[error("node '{type_name}' declares more than one variable-size {side} port")]
  MultipleVariablePorts { type_name: String, side: PortSide },

  #[error("node '{type_name}' declares variable-size {side} port '{port}' that is not last")]
  VariablePortNotLast {
    type_name: String,
    side: PortSide,
    port: String,
  },

  #[error("node '{type_name}' declares {side} port '{port}' twice")]
  DuplicatePort {
    type_name: String,
    side: PortSide,
    port: String,
  },
}
