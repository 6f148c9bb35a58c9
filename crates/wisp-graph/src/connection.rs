use serde::{Deserialize, Serialize};
use wisp_schema::DataType;

use crate::ids::{ConnectionId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
  /// Control sequencing from a flow output to a flow input.
  Flow,
  /// Data from a value output slot to a value input slot.
  Value,
}

/// One end of a connection. For flow connections the destination slot is
/// always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
  pub node: NodeId,
  pub slot: usize,
}

impl Endpoint {
  pub fn new(node: NodeId, slot: usize) -> Self {
    Self { node, slot }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
  pub id: ConnectionId,
  pub kind: ConnectionKind,
  pub source: Endpoint,
  pub destination: Endpoint,
  /// Type carried by a value connection, cached at connect time.
  pub value_type: Option<DataType>,
}

impl Connection {
  pub fn flow(source: Endpoint, destination: NodeId) -> Self {
    Self {
      id: ConnectionId::new(),
      kind: ConnectionKind::Flow,
      source,
      destination: Endpoint::new(destination, 0),
      value_type: None,
    }
  }

  pub fn value(source: Endpoint, destination: Endpoint, value_type: DataType) -> Self {
    Self {
      id: ConnectionId::new(),
      kind: ConnectionKind::Value,
      source,
      destination,
      value_type: Some(value_type),
    }
  }

  pub fn touches(&self, node: NodeId) -> bool {
    self.source.node == node || self.destination.node == node
  }

  pub fn is_self_loop(&self) -> bool {
    self.source.node == self.destination.node
  }
}

/// Result of a value connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
  /// Types were assignable; one connection was made.
  Connected(ConnectionId),
  /// An adapter node was inserted and wired between the endpoints.
  Bridged {
    adapter: NodeId,
    connections: [ConnectionId; 2],
  },
  /// No bridge exists between the port types. Nothing changed.
  Rejected,
}

impl ConnectOutcome {
  pub fn is_rejected(&self) -> bool {
    matches!(self, ConnectOutcome::Rejected)
  }
}
