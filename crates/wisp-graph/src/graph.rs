//! The graph: node, connection and group ownership plus the edit API.
//!
//! Execution (dispatch, flow passes, event broadcast) lives in
//! `dispatch.rs`, the tick loop in `update.rs` and named variables in
//! `variables.rs`. All of them are `impl Graph` blocks over the same shared
//! state.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument};
use wisp_config::EngineConfig;
use wisp_schema::{NodeSchema, PortSide, SchemaCache};

use crate::coercion::find_bridge;
use crate::connection::{ConnectOutcome, Connection, ConnectionKind, Endpoint};
use crate::context::PassTrail;
use crate::error::GraphError;
use crate::ids::{ConnectionId, GroupId, NodeId};
use crate::node::{Node, NodeInstance, Position};
use crate::store::GlobalStore;
use crate::topology::{Group, Topology};
use crate::variables::Variable;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running (or cancelled) flow pass on one node.
///
/// A cancelled pass stays registered until it finishes, so the next pass
/// launched on the same node awaits it.
pub(crate) struct ActivePass {
  pub id: u64,
  pub cancel: CancellationToken,
  pub trail: Arc<PassTrail>,
  pub handle: JoinHandle<()>,
}

impl ActivePass {
  fn affected_by(&self, owner: NodeId, node: NodeId) -> bool {
    owner == node || self.trail.contains(node)
  }
}

pub(crate) struct RunState {
  pub running: bool,
  /// Parent of every context token for the current run.
  pub cancel: CancellationToken,
  pub update_loop: Option<JoinHandle<()>>,
}

pub(crate) struct Shared {
  pub config: EngineConfig,
  pub schemas: SchemaCache,
  pub topology: RwLock<Topology>,
  pub variables: RwLock<HashMap<String, Variable>>,
  pub store: GlobalStore,
  pub passes: Mutex<HashMap<NodeId, Vec<ActivePass>>>,
  pub next_pass: AtomicU64,
  pub run: Mutex<RunState>,
  pub tracker: TaskTracker,
  /// Serializes `wait_idle` callers around the tracker's close and reopen.
  pub idle: tokio::sync::Mutex<()>,
}

/// A node graph and its execution engine.
///
/// Cheap to clone; clones share the same graph. Every edit is applied
/// immediately. Edits that change what a node reads cancel its in-flight
/// passes first and re-dispatch it afterwards, so running passes never see
/// a half-applied edit.
///
/// # Usage
///
/// ```ignore
/// let graph = Graph::new(EngineConfig::default());
/// let value = graph.add_node(Constant::float(1.0))?;
/// let display = graph.add_node(Display::new())?;
/// graph.connect_value(value, 0, display, 0)?;
///
/// graph.start().await;
/// graph.handle_event(GraphEvent::ParameterReceived { .. });
/// graph.stop().await;
/// ```
#[derive(Clone)]
pub struct Graph {
  pub(crate) shared: Arc<Shared>,
}

impl Graph {
  pub fn new(config: EngineConfig) -> Self {
    Self::with_schemas(config, SchemaCache::new())
  }

  /// Create a graph sharing an existing schema cache.
  pub fn with_schemas(config: EngineConfig, schemas: SchemaCache) -> Self {
    Self {
      shared: Arc::new(Shared {
        config,
        schemas,
        topology: RwLock::new(Topology::default()),
        variables: RwLock::new(HashMap::new()),
        store: GlobalStore::new(),
        passes: Mutex::new(HashMap::new()),
        next_pass: AtomicU64::new(0),
        run: Mutex::new(RunState {
          running: false,
          cancel: CancellationToken::new(),
          update_loop: None,
        }),
        tracker: TaskTracker::new(),
        idle: tokio::sync::Mutex::new(()),
      }),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.shared.config
  }

  pub fn schemas(&self) -> &SchemaCache {
    &self.shared.schemas
  }

  pub fn store(&self) -> &GlobalStore {
    &self.shared.store
  }

  pub(crate) fn topology(&self) -> RwLockReadGuard<'_, Topology> {
    self
      .shared
      .topology
      .read()
      .unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) fn topology_mut(&self) -> RwLockWriteGuard<'_, Topology> {
    self
      .shared
      .topology
      .write()
      .unwrap_or_else(PoisonError::into_inner)
  }

  /// Snapshot of a node instance.
  pub fn instance(&self, node: NodeId) -> Option<NodeInstance> {
    self.topology().node(node).cloned()
  }

  pub(crate) fn require(&self, node: NodeId) -> Result<NodeInstance, GraphError> {
    self
      .instance(node)
      .ok_or(GraphError::NodeNotFound { node_id: node })
  }

  // --- nodes ---------------------------------------------------------------

  pub fn add_node(&self, node: impl Node) -> Result<NodeId, GraphError> {
    self.add_node_arc(Arc::new(node))
  }

  pub fn add_node_arc(&self, node: Arc<dyn Node>) -> Result<NodeId, GraphError> {
    self.insert_node(node, None)
  }

  pub fn add_node_at(&self, node: Arc<dyn Node>, position: Position) -> Result<NodeId, GraphError> {
    self.insert_node(node, Some(position))
  }

  fn insert_node(
    &self,
    behavior: Arc<dyn Node>,
    position: Option<Position>,
  ) -> Result<NodeId, GraphError> {
    let type_name = behavior.type_name();
    let schema = self
      .shared
      .schemas
      .get_or_build(&type_name, || behavior.declare())?;

    let id = NodeId::new();
    let mut instance = NodeInstance::new(id, schema, behavior);
    instance.position = position;
    self.topology_mut().nodes.insert(id, instance);

    debug!(node_id = %id, type_name = %type_name, "node_added");
    Ok(id)
  }

  /// Delete a node and everything that references it.
  ///
  /// In-flight passes on the node, and passes currently executing it from an
  /// upstream trigger, are cancelled and awaited first. Touching
  /// connections and group memberships are removed, the node's global store
  /// entries are dropped, and every surviving downstream node is
  /// re-dispatched.
  #[instrument(name = "graph_delete_node", skip(self), fields(node_id = %node))]
  pub async fn delete_node(&self, node: NodeId) -> Result<(), GraphError> {
    if !self.contains_node(node) {
      return Err(GraphError::NodeNotFound { node_id: node });
    }

    for handle in self.take_passes(node) {
      let _ = handle.await;
    }

    let removed = {
      let mut topology = self.topology_mut();
      if topology.nodes.remove(&node).is_none() {
        return Err(GraphError::NodeNotFound { node_id: node });
      }
      for group in topology.groups.values_mut() {
        group.nodes.remove(&node);
      }
      topology.remove_connections_where(|c| c.touches(node))
    };
    self.shared.store.remove_node(node);

    let downstream: BTreeSet<NodeId> = removed
      .iter()
      .filter(|c| c.kind == ConnectionKind::Value && !c.is_self_loop())
      .filter(|c| c.source.node == node)
      .map(|c| c.destination.node)
      .collect();

    info!(
      node_id = %node,
      connections_removed = removed.len(),
      downstream = downstream.len(),
      "node_deleted"
    );

    for destination in downstream {
      self.cancel_passes(destination);
      self.dispatch(destination);
    }
    Ok(())
  }

  pub fn move_node(&self, node: NodeId, position: Position) -> Result<(), GraphError> {
    let mut topology = self.topology_mut();
    let instance = topology
      .nodes
      .get_mut(&node)
      .ok_or(GraphError::NodeNotFound { node_id: node })?;
    instance.position = Some(position);
    Ok(())
  }

  pub fn position(&self, node: NodeId) -> Option<Position> {
    self.topology().node(node).and_then(|n| n.position)
  }

  pub fn contains_node(&self, node: NodeId) -> bool {
    self.topology().nodes.contains_key(&node)
  }

  pub fn node_ids(&self) -> Vec<NodeId> {
    self.topology().nodes.keys().copied().collect()
  }

  pub fn node_count(&self) -> usize {
    self.topology().nodes.len()
  }

  pub fn schema_of(&self, node: NodeId) -> Option<Arc<NodeSchema>> {
    self.topology().node(node).map(|n| n.schema.clone())
  }

  // --- connections ---------------------------------------------------------

  /// Connect flow output `slot` of `source` to the flow input of `destination`.
  ///
  /// A flow output drives at most one node; an existing connection on the
  /// slot is replaced.
  pub fn connect_flow(
    &self,
    source: NodeId,
    slot: usize,
    destination: NodeId,
  ) -> Result<ConnectionId, GraphError> {
    let topology = self.topology();
    let source_node = topology
      .node(source)
      .ok_or(GraphError::NodeNotFound { node_id: source })?;
    if slot >= source_node.schema.flow_outputs.len() {
      return Err(GraphError::InvalidSlot {
        node_id: source,
        side: "flow output".to_string(),
        slot,
      });
    }
    let destination_node = topology.node(destination).ok_or(GraphError::NodeNotFound {
      node_id: destination,
    })?;
    if !destination_node.schema.flags.is_flow_input {
      return Err(GraphError::NotFlowInput {
        node_id: destination,
      });
    }

    let replacing = topology
      .connections
      .iter()
      .any(|c| c.kind == ConnectionKind::Flow && c.source.node == source && c.source.slot == slot);
    drop(topology);

    // Passes inside `source` would continue through the slot being rewired.
    if replacing {
      self.cancel_passes(source);
    }
    let mut topology = self.topology_mut();
    let replaced = topology.remove_connections_where(|c| {
      c.kind == ConnectionKind::Flow && c.source.node == source && c.source.slot == slot
    });
    let connection = Connection::flow(Endpoint::new(source, slot), destination);
    let id = connection.id;
    topology.connections.push(connection);
    drop(topology);

    debug!(
      connection_id = %id,
      source = %source,
      destination = %destination,
      replaced = replaced.len(),
      "flow_connected"
    );
    for old in replaced {
      self.cancel_passes(old.destination.node);
      self.dispatch(old.destination.node);
    }
    Ok(id)
  }

  /// Connect value output `source_slot` to value input `destination_slot`.
  ///
  /// Assignable types connect directly. Otherwise an adapter node is
  /// inserted between the endpoints when one exists, and nothing happens
  /// when none does. Any existing connection into the input slot is
  /// replaced.
  pub fn connect_value(
    &self,
    source: NodeId,
    source_slot: usize,
    destination: NodeId,
    destination_slot: usize,
  ) -> Result<ConnectOutcome, GraphError> {
    let (from, to, midpoint) = {
      let topology = self.topology();
      let source_node = topology
        .node(source)
        .ok_or(GraphError::NodeNotFound { node_id: source })?;
      let destination_node = topology.node(destination).ok_or(GraphError::NodeNotFound {
        node_id: destination,
      })?;
      let from = source_node
        .schema
        .slot_port(PortSide::Output, source_slot, source_node.output_tail)
        .ok_or_else(|| GraphError::InvalidSlot {
          node_id: source,
          side: PortSide::Output.to_string(),
          slot: source_slot,
        })?
        .data_type
        .clone();
      let to = destination_node
        .schema
        .slot_port(PortSide::Input, destination_slot, destination_node.input_tail)
        .ok_or_else(|| GraphError::InvalidSlot {
          node_id: destination,
          side: PortSide::Input.to_string(),
          slot: destination_slot,
        })?
        .data_type
        .clone();
      let midpoint = source_node
        .position
        .zip(destination_node.position)
        .map(|(a, b)| a.midpoint(b));
      (from, to, midpoint)
    };

    if from.is_assignable_to(&to) {
      let connection = Connection::value(
        Endpoint::new(source, source_slot),
        Endpoint::new(destination, destination_slot),
        from,
      );
      let id = connection.id;

      self.cancel_passes(destination);
      let replaced = {
        let mut topology = self.topology_mut();
        let replaced = topology.remove_connections_where(|c| {
          c.kind == ConnectionKind::Value
            && c.destination.node == destination
            && c.destination.slot == destination_slot
        });
        topology.connections.push(connection);
        replaced
      };

      debug!(
        connection_id = %id,
        source = %source,
        destination = %destination,
        replaced = replaced.len(),
        "value_connected"
      );
      self.dispatch(destination);
      return Ok(ConnectOutcome::Connected(id));
    }

    let Some(adapter) = find_bridge(&from, &to) else {
      debug!(
        source = %source,
        destination = %destination,
        from = %from,
        to = %to,
        "connection_rejected"
      );
      return Ok(ConnectOutcome::Rejected);
    };

    let adapter_id = self.insert_node(adapter, midpoint)?;
    let first = self.connect_value(source, source_slot, adapter_id, 0)?;
    let second = self.connect_value(adapter_id, 0, destination, destination_slot)?;
    match (first, second) {
      (ConnectOutcome::Connected(a), ConnectOutcome::Connected(b)) => {
        info!(
          adapter = %adapter_id,
          from = %from,
          to = %to,
          "connection_bridged"
        );
        Ok(ConnectOutcome::Bridged {
          adapter: adapter_id,
          connections: [a, b],
        })
      }
      _ => {
        // Adapters declare exactly the bridged types, so both halves connect.
        self.topology_mut().nodes.remove(&adapter_id);
        Ok(ConnectOutcome::Rejected)
      }
    }
  }

  /// Remove a connection and re-dispatch its destination.
  pub fn disconnect(&self, connection: ConnectionId) -> Result<(), GraphError> {
    let existing = self
      .topology()
      .connection(connection)
      .cloned()
      .ok_or(GraphError::ConnectionNotFound {
        connection_id: connection,
      })?;

    let destination = existing.destination.node;
    self.cancel_passes(destination);
    self.topology_mut().remove_connection(connection);

    debug!(connection_id = %connection, destination = %destination, "disconnected");
    self.dispatch(destination);
    Ok(())
  }

  pub fn connections(&self) -> Vec<Connection> {
    self.topology().connections.clone()
  }

  pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
    self.topology().connection(id).cloned()
  }

  /// The value connection feeding input `slot` of `node`.
  pub fn incoming_value(&self, node: NodeId, slot: usize) -> Option<Connection> {
    self.topology().incoming_value(node, slot).cloned()
  }

  // --- variable-size ports -------------------------------------------------

  /// Resize the variable-size tail on `side` to `count` slots.
  ///
  /// Shrinking removes connections attached to the dropped slots. New slots
  /// read their port default until connected.
  pub fn set_variable_size(
    &self,
    node: NodeId,
    side: PortSide,
    count: usize,
  ) -> Result<(), GraphError> {
    if count == 0 {
      return Err(GraphError::InvalidSize { node_id: node });
    }
    let instance = self.require(node)?;
    if instance.schema.variable_port(side).is_none() {
      return Err(GraphError::NotVariableSize {
        node_id: node,
        side,
      });
    }

    self.cancel_passes(node);
    let removed = {
      let mut topology = self.topology_mut();
      let Some(entry) = topology.nodes.get_mut(&node) else {
        return Err(GraphError::NodeNotFound { node_id: node });
      };
      match side {
        PortSide::Input => entry.input_tail = count,
        PortSide::Output => entry.output_tail = count,
      }
      let slots = entry.slot_count(side);
      topology.remove_connections_where(|c| {
        c.kind == ConnectionKind::Value
          && match side {
            PortSide::Input => c.destination.node == node && c.destination.slot >= slots,
            PortSide::Output => c.source.node == node && c.source.slot >= slots,
          }
      })
    };

    debug!(
      node_id = %node,
      side = %side,
      count,
      connections_removed = removed.len(),
      "variable_size_changed"
    );

    for connection in removed {
      if connection.destination.node != node {
        self.dispatch(connection.destination.node);
      }
    }
    self.dispatch(node);
    Ok(())
  }

  pub fn input_slot_count(&self, node: NodeId) -> Option<usize> {
    self
      .topology()
      .node(node)
      .map(|n| n.slot_count(PortSide::Input))
  }

  pub fn output_slot_count(&self, node: NodeId) -> Option<usize> {
    self
      .topology()
      .node(node)
      .map(|n| n.slot_count(PortSide::Output))
  }

  // --- groups --------------------------------------------------------------

  pub fn create_group(&self, title: impl Into<String>) -> GroupId {
    let id = GroupId::new();
    self.topology_mut().groups.insert(
      id,
      Group {
        id,
        title: title.into(),
        nodes: BTreeSet::new(),
      },
    );
    id
  }

  pub fn add_to_group(&self, group: GroupId, node: NodeId) -> Result<(), GraphError> {
    let mut topology = self.topology_mut();
    if !topology.nodes.contains_key(&node) {
      return Err(GraphError::NodeNotFound { node_id: node });
    }
    let entry = topology
      .groups
      .get_mut(&group)
      .ok_or(GraphError::GroupNotFound { group_id: group })?;
    entry.nodes.insert(node);
    Ok(())
  }

  pub fn remove_from_group(&self, group: GroupId, node: NodeId) -> Result<(), GraphError> {
    let mut topology = self.topology_mut();
    let entry = topology
      .groups
      .get_mut(&group)
      .ok_or(GraphError::GroupNotFound { group_id: group })?;
    entry.nodes.remove(&node);
    Ok(())
  }

  /// Delete a group. Its member nodes stay in the graph.
  pub fn delete_group(&self, group: GroupId) -> Result<Group, GraphError> {
    self
      .topology_mut()
      .groups
      .remove(&group)
      .ok_or(GraphError::GroupNotFound { group_id: group })
  }

  pub fn group(&self, group: GroupId) -> Option<Group> {
    self.topology().groups.get(&group).cloned()
  }

  pub fn groups(&self) -> Vec<Group> {
    self.topology().groups.values().cloned().collect()
  }

  // --- passes --------------------------------------------------------------

  /// Cancel every pass on `node` or currently executing it.
  ///
  /// The passes stay registered until they finish, so a pass launched on the
  /// same trigger afterwards waits for them.
  pub(crate) fn cancel_passes(&self, node: NodeId) {
    let passes = lock(&self.shared.passes);
    for (owner, list) in passes.iter() {
      for pass in list.iter().filter(|p| p.affected_by(*owner, node)) {
        pass.cancel.cancel();
      }
    }
  }

  /// Cancel every pass on `node` or currently executing it, unregister them
  /// and hand back their handles for awaiting.
  pub(crate) fn take_passes(&self, node: NodeId) -> Vec<JoinHandle<()>> {
    let mut passes = lock(&self.shared.passes);
    let mut handles = Vec::new();
    for (owner, list) in passes.iter_mut() {
      let (taken, kept): (Vec<ActivePass>, Vec<ActivePass>) = std::mem::take(list)
        .into_iter()
        .partition(|p| p.affected_by(*owner, node));
      *list = kept;
      for pass in taken {
        pass.cancel.cancel();
        handles.push(pass.handle);
      }
    }
    passes.retain(|_, list| !list.is_empty());
    handles
  }

  /// Number of flow passes currently registered across all nodes.
  pub fn active_pass_count(&self) -> usize {
    lock(&self.shared.passes).values().map(Vec::len).sum()
  }
}
