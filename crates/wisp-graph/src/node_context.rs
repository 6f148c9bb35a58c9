//! The surface a node body sees while it runs.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wisp_schema::{PortSide, Value};

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::Graph;
use crate::ids::NodeId;
use crate::node::NodeInstance;

static NONE: Value = Value::None;

/// Handle passed to [`Node`](crate::Node) callbacks.
///
/// Inputs are resolved before the callback runs, one value per input port
/// (a variable-size tail arrives as a [`Value::Array`]). Output writes land
/// in the current execution context.
pub struct NodeContext {
  graph: Graph,
  instance: NodeInstance,
  scope: Arc<ExecutionContext>,
  inputs: Vec<Value>,
}

impl NodeContext {
  pub(crate) fn new(
    graph: Graph,
    instance: NodeInstance,
    scope: Arc<ExecutionContext>,
    inputs: Vec<Value>,
  ) -> Self {
    Self {
      graph,
      instance,
      scope,
      inputs,
    }
  }

  pub fn node_id(&self) -> NodeId {
    self.instance.id
  }

  pub fn type_name(&self) -> &str {
    self.instance.type_name()
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn scope(&self) -> &Arc<ExecutionContext> {
    &self.scope
  }

  pub fn cancellation(&self) -> &CancellationToken {
    self.scope.cancellation()
  }

  pub fn inputs(&self) -> &[Value] {
    &self.inputs
  }

  /// Resolved value of input port `name`; `Value::None` for unknown ports.
  pub fn input(&self, name: &str) -> &Value {
    self
      .instance
      .schema
      .inputs
      .iter()
      .position(|port| port.name == name)
      .and_then(|index| self.inputs.get(index))
      .unwrap_or(&NONE)
  }

  pub fn input_float(&self, name: &str) -> Option<f64> {
    self.input(name).as_float()
  }

  pub fn input_int(&self, name: &str) -> Option<i64> {
    self.input(name).as_int()
  }

  pub fn input_bool(&self, name: &str) -> Option<bool> {
    self.input(name).as_bool()
  }

  pub fn input_text(&self, name: &str) -> Option<&str> {
    self.input(name).as_text()
  }

  /// Configured length of the variable-size tail on `side`.
  pub fn tail(&self, side: PortSide) -> usize {
    self.instance.tail(side)
  }

  fn output_index(&self, name: &str) -> Result<usize, NodeError> {
    self
      .instance
      .schema
      .outputs
      .iter()
      .position(|port| port.name == name)
      .ok_or_else(|| NodeError::InvalidOutput {
        port: name.to_string(),
      })
  }

  pub fn set_output(&self, name: &str, value: impl Into<Value>) -> Result<(), NodeError> {
    let index = self.output_index(name)?;
    self
      .scope
      .write_output(self.instance.id, index, value.into());
    Ok(())
  }

  /// Write one element of a variable-size output tail.
  pub fn set_output_element(
    &self,
    name: &str,
    element: usize,
    value: impl Into<Value>,
  ) -> Result<(), NodeError> {
    let index = self.output_index(name)?;
    if self
      .scope
      .write_output_element(self.instance.id, index, element, value.into())
    {
      Ok(())
    } else {
      Err(NodeError::InvalidOutput {
        port: format!("{}[{}]", name, element),
      })
    }
  }

  /// Current value of one of this node's outputs.
  pub fn output(&self, name: &str) -> Option<Value> {
    let index = self.output_index(name).ok()?;
    self.scope.read_output(self.instance.id, index)
  }

  fn flow_slot(&self, name: &str) -> Result<usize, NodeError> {
    self
      .instance
      .schema
      .flow_output_index(name)
      .ok_or_else(|| NodeError::failed(format!("no flow output '{}'", name)))
  }

  /// Fire flow output `name` in the current scope and wait for the
  /// continuation to finish.
  pub async fn continue_flow(&self, name: &str) -> Result<(), NodeError> {
    let slot = self.flow_slot(name)?;
    self
      .graph
      .continue_flow(self.instance.id, slot, self.scope.clone())
      .await
      .map_err(NodeError::from)
  }

  /// Fire flow output `name` in a fresh child scope. Memory written by the
  /// continuation is dropped when it returns.
  pub async fn continue_flow_scoped(&self, name: &str) -> Result<(), NodeError> {
    let slot = self.flow_slot(name)?;
    self
      .graph
      .continue_flow(self.instance.id, slot, self.scope.child())
      .await
      .map_err(NodeError::from)
  }

  /// Read this node's entry in the global store.
  pub fn stored(&self, handle: &str) -> Option<Value> {
    self.graph.store().get(self.instance.id, handle)
  }

  pub fn store(&self, handle: &str, value: impl Into<Value>) -> Option<Value> {
    self.graph.store().set(self.instance.id, handle, value.into())
  }

  pub fn update_stored(&self, handle: &str, f: impl FnOnce(Option<&Value>) -> Value) -> Value {
    self.graph.store().update(self.instance.id, handle, f)
  }

  pub fn keyed(&self, key: &str) -> Option<Value> {
    self.scope.keyed_get(key)
  }

  pub fn set_keyed(&self, key: &str, value: impl Into<Value>) {
    self.scope.keyed_set(key, value.into());
  }

  pub fn variable(&self, name: &str) -> Option<Value> {
    self.graph.variable(name)
  }

  pub fn set_variable(&self, name: &str, value: impl Into<Value>) -> Result<(), NodeError> {
    self
      .graph
      .set_variable(name, value.into())
      .map_err(|e| NodeError::failed(e.to_string()))
  }

  /// Return `Cancelled` if this node's scope has been cancelled.
  pub fn checkpoint(&self) -> Result<(), NodeError> {
    if self.scope.is_cancelled() {
      return Err(NodeError::Cancelled);
    }
    Ok(())
  }

  /// Sleep unless cancelled first.
  pub async fn sleep(&self, duration: Duration) -> Result<(), NodeError> {
    tokio::select! {
      _ = self.scope.cancellation().cancelled() => Err(NodeError::Cancelled),
      _ = tokio::time::sleep(duration) => Ok(()),
    }
  }
}

