//! Registration-time description of a node type.
//!
//! A node type describes its processing operation as an ordered parameter
//! list: an optional leading cancellation parameter, value inputs, then
//! trailing value outputs. [`NodeSchema::build`](crate::NodeSchema::build)
//! validates that shape and derives the schema the engine consumes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::port::NodePort;

/// External event categories a node may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Start,
  Stop,
  ParameterReceived,
  AvatarChanged,
  SpeechPartial,
  SpeechFinal,
  InstanceJoined,
  InstanceLeft,
  VariableChanged,
}

/// One positional parameter of a node's processing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
  /// The cancellation token a flow node receives. Must come first.
  Cancellation,
  Input(NodePort),
  Output(NodePort),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
  /// Events offered to the node while the graph runs.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub events: BTreeSet<EventKind>,

  /// Offered a recompute on every update tick; a change propagates.
  #[serde(default)]
  pub active_update: bool,

  /// Runs on every update tick; never propagates.
  #[serde(default)]
  pub passive_update: bool,
}

impl Capabilities {
  pub fn handles(&self, kind: EventKind) -> bool {
    self.events.contains(&kind)
  }
}

/// Everything a node type declares about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDeclaration {
  pub type_name: String,
  pub flow_input: bool,
  pub flow_outputs: Vec<String>,
  pub parameters: Vec<Parameter>,
  pub force_reprocess: bool,
  pub multi_flow: bool,
  pub capabilities: Capabilities,
}

impl NodeDeclaration {
  pub fn new(type_name: impl Into<String>) -> Self {
    Self {
      type_name: type_name.into(),
      flow_input: false,
      flow_outputs: Vec::new(),
      parameters: Vec::new(),
      force_reprocess: false,
      multi_flow: false,
      capabilities: Capabilities::default(),
    }
  }

  pub fn flow_input(mut self) -> Self {
    self.flow_input = true;
    self
  }

  pub fn flow_output(mut self, name: impl Into<String>) -> Self {
    self.flow_outputs.push(name.into());
    self
  }

  pub fn cancellable(mut self) -> Self {
    self.parameters.push(Parameter::Cancellation);
    self
  }

  pub fn input(mut self, port: NodePort) -> Self {
    self.parameters.push(Parameter::Input(port));
    self
  }

  pub fn output(mut self, port: NodePort) -> Self {
    self.parameters.push(Parameter::Output(port));
    self
  }

  /// Re-run the body even when memory already exists in the context chain.
  pub fn force_reprocess(mut self) -> Self {
    self.force_reprocess = true;
    self
  }

  /// Allow overlapping passes on one instance.
  pub fn multi_flow(mut self) -> Self {
    self.multi_flow = true;
    self
  }

  pub fn handles(mut self, kind: EventKind) -> Self {
    self.capabilities.events.insert(kind);
    self
  }

  pub fn active_update(mut self) -> Self {
    self.capabilities.active_update = true;
    self
  }

  pub fn passive_update(mut self) -> Self {
    self.capabilities.passive_update = true;
    self
  }
}
