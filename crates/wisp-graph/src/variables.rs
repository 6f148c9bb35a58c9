//! Named, typed graph variables.
//!
//! Setting a variable broadcasts [`GraphEvent::VariableChanged`] so getter
//! nodes can propagate the new value. Non-persistent variables reset to
//! their type default when the graph stops.

use std::sync::PoisonError;

use serde::Serialize;
use tracing::debug;
use wisp_schema::{DataType, Value};

use crate::error::GraphError;
use crate::events::GraphEvent;
use crate::graph::Graph;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
  pub name: String,
  pub data_type: DataType,
  pub value: Value,
  /// Keeps its value across stop/start.
  pub persistent: bool,
}

impl Graph {
  pub fn create_variable(
    &self,
    name: impl Into<String>,
    data_type: DataType,
    persistent: bool,
  ) -> Result<(), GraphError> {
    let name = name.into();
    let mut variables = self
      .shared
      .variables
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    if variables.contains_key(&name) {
      return Err(GraphError::VariableExists { name });
    }
    let value = data_type.default_value();
    variables.insert(
      name.clone(),
      Variable {
        name,
        data_type,
        value,
        persistent,
      },
    );
    Ok(())
  }

  /// Assign a variable, converting the value to its declared type.
  pub fn set_variable(&self, name: &str, value: Value) -> Result<(), GraphError> {
    {
      let mut variables = self
        .shared
        .variables
        .write()
        .unwrap_or_else(PoisonError::into_inner);
      let variable = variables
        .get_mut(name)
        .ok_or_else(|| GraphError::VariableNotFound {
          name: name.to_string(),
        })?;
      let converted =
        value
          .cast_to(&variable.data_type)
          .ok_or_else(|| GraphError::VariableType {
            name: name.to_string(),
            expected: variable.data_type.to_string(),
            value: value.to_string(),
          })?;
      if variable.value == converted {
        return Ok(());
      }
      variable.value = converted;
    }

    debug!(variable = %name, "variable_changed");
    self.handle_event(GraphEvent::VariableChanged {
      name: name.to_string(),
    });
    Ok(())
  }

  pub fn variable(&self, name: &str) -> Option<Value> {
    self
      .shared
      .variables
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .map(|v| v.value.clone())
  }

  pub fn variables(&self) -> Vec<Variable> {
    self
      .shared
      .variables
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect()
  }

  pub fn delete_variable(&self, name: &str) -> Result<Variable, GraphError> {
    self
      .shared
      .variables
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(name)
      .ok_or_else(|| GraphError::VariableNotFound {
        name: name.to_string(),
      })
  }

  pub(crate) fn reset_variables(&self) {
    let mut variables = self
      .shared
      .variables
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    for variable in variables.values_mut().filter(|v| !v.persistent) {
      variable.value = variable.data_type.default_value();
    }
  }
}
