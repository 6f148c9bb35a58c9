//! Nodes, connections and groups owned by a graph.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::connection::{Connection, ConnectionKind};
use crate::ids::{ConnectionId, GroupId, NodeId};
use crate::node::NodeInstance;

/// Organizational grouping of nodes. Has no effect on execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
  pub id: GroupId,
  pub title: String,
  pub nodes: BTreeSet<NodeId>,
}

#[derive(Default)]
pub(crate) struct Topology {
  pub nodes: HashMap<NodeId, NodeInstance>,
  pub connections: Vec<Connection>,
  pub groups: HashMap<GroupId, Group>,
}

impl Topology {
  pub fn node(&self, id: NodeId) -> Option<&NodeInstance> {
    self.nodes.get(&id)
  }

  pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
    self.connections.iter().find(|c| c.id == id)
  }

  /// The value connection feeding input `slot` of `node`, if any.
  pub fn incoming_value(&self, node: NodeId, slot: usize) -> Option<&Connection> {
    self.connections.iter().find(|c| {
      c.kind == ConnectionKind::Value && c.destination.node == node && c.destination.slot == slot
    })
  }

  /// The flow connection leaving flow output `slot` of `node`, if any.
  pub fn outgoing_flow(&self, node: NodeId, slot: usize) -> Option<&Connection> {
    self
      .connections
      .iter()
      .find(|c| c.kind == ConnectionKind::Flow && c.source.node == node && c.source.slot == slot)
  }

  pub fn outgoing_value(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
    self
      .connections
      .iter()
      .filter(move |c| c.kind == ConnectionKind::Value && c.source.node == node)
  }

  pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
    let position = self.connections.iter().position(|c| c.id == id)?;
    Some(self.connections.remove(position))
  }

  /// Remove every connection matching `predicate`, returning them.
  pub fn remove_connections_where(
    &mut self,
    mut predicate: impl FnMut(&Connection) -> bool,
  ) -> Vec<Connection> {
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
      .into_iter()
      .partition(|c| predicate(c));
    self.connections = kept;
    removed
  }
}
