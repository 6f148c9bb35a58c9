//! Graph and node errors.

use wisp_schema::{PortSide, SchemaError};

use crate::ids::{ConnectionId, GroupId, NodeId};

/// Errors that can occur during graph edits and execution.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
  #[error("node '{node_id}' not found in graph")]
  NodeNotFound { node_id: NodeId },

  #[error("connection '{connection_id}' not found in graph")]
  ConnectionNotFound { connection_id: ConnectionId },

  #[error("group '{group_id}' not found in graph")]
  GroupNotFound { group_id: GroupId },

  #[error("variable '{name}' not found")]
  VariableNotFound { name: String },

  #[error("variable '{name}' already exists")]
  VariableExists { name: String },

  /// A value could not be converted to the variable's declared type.
  #[error("variable '{name}' expects {expected}, got '{value}'")]
  VariableType {
    name: String,
    expected: String,
    value: String,
  },

  #[error("node '{node_id}' has no {side} slot {slot}")]
  InvalidSlot {
    node_id: NodeId,
    side: String,
    slot: usize,
  },

  #[error("node '{node_id}' does not accept flow input")]
  NotFlowInput { node_id: NodeId },

  #[error("node '{node_id}' has no variable-size {side} port")]
  NotVariableSize { node_id: NodeId, side: PortSide },

  /// Variable-size ports always expose at least one slot.
  #[error("node '{node_id}' variable-size ports need at least one slot")]
  InvalidSize { node_id: NodeId },

  #[error(transparent)]
  Schema(#[from] SchemaError),

  /// A node body failed during a pass.
  #[error("node '{node_id}' ({type_name}) failed: {source}")]
  NodeFailed {
    node_id: NodeId,
    type_name: String,
    #[source]
    source: NodeError,
  },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,
}

impl GraphError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, GraphError::Cancelled)
  }
}

/// Errors a node body reports back to the engine.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
  /// The node observed cancellation at a checkpoint.
  #[error("cancelled")]
  Cancelled,

  #[error("{message}")]
  Failed { message: String },

  /// The body wrote to an output the node does not declare.
  #[error("no output '{port}'")]
  InvalidOutput { port: String },

  /// A flow continuation failed further down the pass.
  #[error("flow continuation failed")]
  Continuation(#[source] Box<GraphError>),
}

impl NodeError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }
}

impl From<GraphError> for NodeError {
  fn from(e: GraphError) -> Self {
    match e {
      GraphError::Cancelled => NodeError::Cancelled,
      other => NodeError::Continuation(Box::new(other)),
    }
  }
}
