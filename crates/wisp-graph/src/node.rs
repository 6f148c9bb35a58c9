//! Node behaviour contract and node instances.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wisp_schema::{NodeDeclaration, NodeSchema, PortSide, SlotRef, Value};

use crate::error::NodeError;
use crate::events::GraphEvent;
use crate::ids::NodeId;
use crate::node_context::NodeContext;

/// Behaviour of a node type.
///
/// The engine derives a [`NodeSchema`] from [`Node::declare`] once per type
/// name and then drives the node only through this trait:
///
/// - `process` is the body run during a pass, after all value inputs have
///   been resolved. Flow nodes fire their outputs with
///   [`NodeContext::continue_flow`].
/// - `on_event` is offered every event the node declares a capability for.
///   Returning `true` means the node changed and should propagate. A flow
///   trigger that handles an event then starts a pass on itself; it should
///   hand event data to that pass through the keyed store rather than its
///   outputs, since existing memory would make the pass skip the body.
/// - `on_update` runs each tick for active-update nodes and returns whether
///   the exposed value changed.
/// - `on_passive_update` runs each tick for passive-update nodes and may only
///   touch auxiliary state.
#[async_trait]
pub trait Node: Send + Sync + 'static {
  fn type_name(&self) -> Cow<'static, str>;

  fn declare(&self) -> NodeDeclaration;

  /// Guard evaluated after inputs are resolved. `false` skips the body.
  fn should_process(&self, _inputs: &[Value]) -> bool {
    true
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError>;

  async fn on_event(&self, _ctx: &mut NodeContext, _event: &GraphEvent) -> Result<bool, NodeError> {
    Ok(false)
  }

  async fn on_update(&self, _ctx: &mut NodeContext) -> Result<bool, NodeError> {
    Ok(false)
  }

  fn on_passive_update(&self, _ctx: &NodeContext) {}
}

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
  pub x: f32,
  pub y: f32,
}

impl Position {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn midpoint(self, other: Position) -> Position {
    Position::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
  }
}

/// A node placed in a graph.
#[derive(Clone)]
pub struct NodeInstance {
  pub id: NodeId,
  pub schema: Arc<NodeSchema>,
  pub behavior: Arc<dyn Node>,
  /// Configured length of the variable-size input tail.
  pub input_tail: usize,
  /// Configured length of the variable-size output tail.
  pub output_tail: usize,
  pub position: Option<Position>,
}

impl NodeInstance {
  pub(crate) fn new(id: NodeId, schema: Arc<NodeSchema>, behavior: Arc<dyn Node>) -> Self {
    Self {
      id,
      schema,
      behavior,
      input_tail: 1,
      output_tail: 1,
      position: None,
    }
  }

  pub fn type_name(&self) -> &str {
    &self.schema.type_name
  }

  pub fn tail(&self, side: PortSide) -> usize {
    match side {
      PortSide::Input => self.input_tail,
      PortSide::Output => self.output_tail,
    }
  }

  pub fn slot_count(&self, side: PortSide) -> usize {
    self.schema.slot_count(side, self.tail(side))
  }

  pub fn slot(&self, side: PortSide, slot: usize) -> Option<SlotRef> {
    self.schema.slot(side, slot, self.tail(side))
  }

  /// Neither flow input nor flow output: evaluated lazily during backtracking.
  pub fn is_value_node(&self) -> bool {
    !self.schema.flags.is_flow_input && !self.schema.flags.is_flow_output
  }

  /// Originates flow: flow output without flow input.
  pub fn is_flow_trigger(&self) -> bool {
    self.schema.flags.is_flow_output && !self.schema.flags.is_flow_input
  }

  /// Fresh memory for this node: one default per output port, with the
  /// variable tail expanded to its configured length.
  pub fn output_defaults(&self) -> Vec<Value> {
    self
      .schema
      .outputs
      .iter()
      .map(|port| {
        if port.variable_size {
          Value::Array(vec![port.static_default(); self.output_tail])
        } else {
          port.static_default()
        }
      })
      .collect()
  }

  /// Default for a single output slot, used when a source has no memory.
  pub fn output_slot_default(&self, slot: usize) -> Option<Value> {
    let slot_ref = self.slot(PortSide::Output, slot)?;
    Some(self.schema.outputs[slot_ref.port].static_default())
  }
}

impl std::fmt::Debug for NodeInstance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NodeInstance")
      .field("id", &self.id)
      .field("type_name", &self.schema.type_name)
      .field("input_tail", &self.input_tail)
      .field("output_tail", &self.output_tail)
      .field("position", &self.position)
      .finish()
  }
}
