//! Pure value nodes: constants and arithmetic.

use std::borrow::Cow;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use wisp_graph::{Node, NodeContext, NodeError};
use wisp_schema::{DataType, NodeDeclaration, NodePort, PortSide, Value};

/// A fixed value. The type name carries the data type so each type gets its
/// own schema.
pub struct Constant {
  data_type: DataType,
  value: RwLock<Value>,
}

impl Constant {
  pub fn new(value: impl Into<Value>) -> Self {
    let value = value.into();
    Self {
      data_type: value.data_type(),
      value: RwLock::new(value),
    }
  }

  pub fn float(value: f64) -> Self {
    Self::new(value)
  }

  pub fn int(value: i64) -> Self {
    Self::new(value)
  }

  pub fn text(value: impl Into<String>) -> Self {
    Self::new(value.into())
  }

  pub fn value(&self) -> Value {
    self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Replace the value. Values of another type are cast when possible;
  /// returns `false` when the value was rejected.
  ///
  /// The caller dispatches the node afterwards to propagate the change.
  pub fn set(&self, value: impl Into<Value>) -> bool {
    let Some(value) = value.into().cast_to(&self.data_type) else {
      return false;
    };
    *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    true
  }
}

#[async_trait]
impl Node for Constant {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("constant<{}>", self.data_type))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name()).output(NodePort::new("value", self.data_type.clone()))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    ctx.set_output("value", self.value())
  }
}

fn binary(type_name: &str, result: &str) -> NodeDeclaration {
  NodeDeclaration::new(type_name)
    .input(NodePort::new("a", DataType::Float))
    .input(NodePort::new("b", DataType::Float))
    .output(NodePort::new(result, DataType::Float))
}

/// `sum = a + b`
pub struct Add;

#[async_trait]
impl Node for Add {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("add")
  }

  fn declare(&self) -> NodeDeclaration {
    binary("add", "sum")
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let a = ctx.input_float("a").unwrap_or_default();
    let b = ctx.input_float("b").unwrap_or_default();
    ctx.set_output("sum", a + b)
  }
}

/// `product = a * b`, with `b` defaulting to one.
pub struct Multiply;

#[async_trait]
impl Node for Multiply {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("multiply")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("a", DataType::Float))
      .input(NodePort::new("b", DataType::Float).with_default(1.0))
      .output(NodePort::new("product", DataType::Float))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let a = ctx.input_float("a").unwrap_or_default();
    let b = ctx.input_float("b").unwrap_or(1.0);
    ctx.set_output("product", a * b)
  }
}

/// Sum of a variable-size list of floats.
pub struct Sum;

#[async_trait]
impl Node for Sum {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("sum")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("values", DataType::Float).variable())
      .output(NodePort::new("total", DataType::Float))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let total: f64 = ctx
      .input("values")
      .as_array()
      .unwrap_or_default()
      .iter()
      .filter_map(Value::as_float)
      .sum();
    ctx.set_output("total", total)
  }
}

/// Spreads a float array over a variable-size output tail. Missing elements
/// read zero.
pub struct Split;

#[async_trait]
impl Node for Split {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("split")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("list", DataType::array_of(DataType::Float)))
      .output(NodePort::new("items", DataType::Float).variable())
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let items: Vec<f64> = ctx
      .input("list")
      .as_array()
      .unwrap_or_default()
      .iter()
      .map(|item| item.as_float().unwrap_or_default())
      .collect();

    for element in 0..ctx.tail(PortSide::Output) {
      let value = items.get(element).copied().unwrap_or_default();
      ctx.set_output_element("items", element, value)?;
    }
    Ok(())
  }
}
