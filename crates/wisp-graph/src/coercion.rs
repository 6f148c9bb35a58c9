//! Adapter nodes inserted when a value connection joins mismatched types.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use wisp_schema::{DataType, NodeDeclaration, NodePort, Value};

use crate::error::NodeError;
use crate::node::Node;
use crate::node_context::NodeContext;

/// Find an adapter able to carry `from` values into a `to` port.
///
/// Native implicit conversions get a [`CastAdapter`]; any type going into
/// text gets a [`StringifyAdapter`].
pub fn find_bridge(from: &DataType, to: &DataType) -> Option<Arc<dyn Node>> {
  if from.implicitly_casts_to(to) {
    return Some(Arc::new(CastAdapter::new(from.clone(), to.clone())));
  }
  if *to == DataType::Text {
    return Some(Arc::new(StringifyAdapter::new(from.clone())));
  }
  None
}

/// Numeric/enum conversion between two port types.
#[derive(Debug, Clone)]
pub struct CastAdapter {
  from: DataType,
  to: DataType,
}

impl CastAdapter {
  pub fn new(from: DataType, to: DataType) -> Self {
    Self { from, to }
  }
}

#[async_trait]
impl Node for CastAdapter {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("cast<{},{}>", self.from, self.to))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("in", self.from.clone()))
      .output(NodePort::new("out", self.to.clone()))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let input = ctx.input("in");
    let value = input.cast_to(&self.to).ok_or_else(|| {
      NodeError::failed(format!("cannot cast '{}' to {}", input, self.to))
    })?;
    ctx.set_output("out", value)
  }
}

/// Renders any value as text.
#[derive(Debug, Clone)]
pub struct StringifyAdapter {
  from: DataType,
}

impl StringifyAdapter {
  pub fn new(from: DataType) -> Self {
    Self { from }
  }
}

#[async_trait]
impl Node for StringifyAdapter {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("stringify<{}>", self.from))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("in", self.from.clone()))
      .output(NodePort::new("out", DataType::Text))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let text = Value::Text(ctx.input("in").to_string());
    ctx.set_output("out", text)
  }
}
