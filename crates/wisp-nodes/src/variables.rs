//! Reading graph variables.
//!
//! Writes go through [`SetVariable`](crate::SetVariable), a flow node.

use std::borrow::Cow;

use async_trait::async_trait;
use wisp_graph::{GraphEvent, Node, NodeContext, NodeError};
use wisp_schema::{DataType, EventKind, NodeDeclaration, NodePort};

/// Current value of a named variable. Re-dispatches whenever the variable
/// changes.
pub struct GetVariable {
  name: String,
  data_type: DataType,
}

impl GetVariable {
  pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
    Self {
      name: name.into(),
      data_type,
    }
  }
}

#[async_trait]
impl Node for GetVariable {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("get_variable<{}>", self.data_type))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .output(NodePort::new("value", self.data_type.clone()))
      .handles(EventKind::VariableChanged)
  }

  async fn on_event(&self, _ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    Ok(matches!(event, GraphEvent::VariableChanged { name } if *name == self.name))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx
      .variable(&self.name)
      .and_then(|v| v.cast_to(&self.data_type))
      .unwrap_or_else(|| self.data_type.default_value());
    ctx.set_output("value", value)
  }
}
