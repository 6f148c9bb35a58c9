//! Derived, immutable per-type node schema.

use std::collections::HashSet;

use serde::Serialize;

use crate::declaration::{Capabilities, NodeDeclaration, Parameter};
use crate::error::SchemaError;
use crate::port::{NodePort, PortSide};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeFlags {
  pub is_flow_input: bool,
  pub is_flow_output: bool,
  pub is_value_input: bool,
  pub is_value_output: bool,
  pub is_trigger: bool,
  pub force_reprocess: bool,
  pub multi_flow: bool,
}

/// Position of a slot within a schema's ports.
///
/// `element` is set when the slot belongs to the variable-size tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
  pub port: usize,
  pub element: Option<usize>,
}

/// The schema the engine consumes for a node type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
  pub type_name: String,
  pub inputs: Vec<NodePort>,
  pub outputs: Vec<NodePort>,
  pub flow_outputs: Vec<String>,
  pub flags: NodeFlags,
  pub capabilities: Capabilities,
}

impl NodeSchema {
  /// Validate a declaration and derive its schema.
  pub fn build(decl: &NodeDeclaration) -> Result<Self, SchemaError> {
    let type_name = decl.type_name.clone();
    let is_flow = decl.flow_input || !decl.flow_outputs.is_empty();

    let mut has_cancellation = false;
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for (position, parameter) in decl.parameters.iter().enumerate() {
      match parameter {
        Parameter::Cancellation => {
          if position != 0 {
            return Err(SchemaError::MisplacedCancellation {
              type_name,
              position,
            });
          }
          has_cancellation = true;
        }
        Parameter::Input(port) => {
          if !outputs.is_empty() {
            return Err(SchemaError::OutputsNotTrailing {
              type_name,
              port: port.name.clone(),
            });
          }
          inputs.push(port.clone());
        }
        Parameter::Output(port) => outputs.push(port.clone()),
      }
    }

    if is_flow && !has_cancellation {
      return Err(SchemaError::MissingCancellation { type_name });
    }

    validate_side(&type_name, PortSide::Input, &inputs)?;
    validate_side(&type_name, PortSide::Output, &outputs)?;

    let is_flow_input = decl.flow_input;
    let is_flow_output = !decl.flow_outputs.is_empty();
    let is_value_input = !inputs.is_empty();
    let is_value_output = !outputs.is_empty();
    let is_trigger = (is_flow_output && !is_flow_input)
      || (is_value_input && !is_value_output && !is_flow_input && !is_flow_output);

    Ok(Self {
      type_name,
      inputs,
      outputs,
      flow_outputs: decl.flow_outputs.clone(),
      flags: NodeFlags {
        is_flow_input,
        is_flow_output,
        is_value_input,
        is_value_output,
        is_trigger,
        force_reprocess: decl.force_reprocess,
        multi_flow: decl.multi_flow,
      },
      capabilities: decl.capabilities.clone(),
    })
  }

  pub fn ports(&self, side: PortSide) -> &[NodePort] {
    match side {
      PortSide::Input => &self.inputs,
      PortSide::Output => &self.outputs,
    }
  }

  /// The variable-size port on `side`, if any. It is always the last port.
  pub fn variable_port(&self, side: PortSide) -> Option<&NodePort> {
    self.ports(side).last().filter(|port| port.variable_size)
  }

  /// Number of slots on `side` given the instance's tail length.
  pub fn slot_count(&self, side: PortSide, tail: usize) -> usize {
    let ports = self.ports(side);
    match self.variable_port(side) {
      Some(_) => ports.len() - 1 + tail,
      None => ports.len(),
    }
  }

  /// Map a flat slot index to its port (and tail element).
  pub fn slot(&self, side: PortSide, slot: usize, tail: usize) -> Option<SlotRef> {
    let ports = self.ports(side);
    match self.variable_port(side) {
      Some(_) => {
        let fixed = ports.len() - 1;
        if slot < fixed {
          Some(SlotRef {
            port: slot,
            element: None,
          })
        } else if slot < fixed + tail {
          Some(SlotRef {
            port: fixed,
            element: Some(slot - fixed),
          })
        } else {
          None
        }
      }
      None => (slot < ports.len()).then_some(SlotRef {
        port: slot,
        element: None,
      }),
    }
  }

  /// The port a slot belongs to.
  pub fn slot_port(&self, side: PortSide, slot: usize, tail: usize) -> Option<&NodePort> {
    self
      .slot(side, slot, tail)
      .map(|slot_ref| &self.ports(side)[slot_ref.port])
  }

  pub fn flow_output_index(&self, name: &str) -> Option<usize> {
    self.flow_outputs.iter().position(|flow| flow == name)
  }
}

fn validate_side(type_name: &str, side: PortSide, ports: &[NodePort]) -> Result<(), SchemaError> {
  let variable_count = ports.iter().filter(|port| port.variable_size).count();
  if variable_count > 1 {
    return Err(SchemaError::MultipleVariablePorts {
      type_name: type_name.to_string(),
      side,
    });
  }
  if let Some(position) = ports.iter().position(|port| port.variable_size) {
    if position != ports.len() - 1 {
      return Err(SchemaError::VariablePortNotLast {
        type_name: type_name.to_string(),
        side,
        port: ports[position].name.clone(),
      });
    }
  }

  let mut seen = HashSet::new();
  for port in ports {
    if !seen.insert(port.name.as_str()) {
      return Err(SchemaError::DuplicatePort {
        type_name: type_name.to_string(),
        side,
        port: port.name.clone(),
      });
    }
  }
  Ok(())
}
