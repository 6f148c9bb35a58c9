//! Flow control nodes. Each takes a flow input and decides which flow
//! outputs to fire.

use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use wisp_graph::{Node, NodeContext, NodeError};
use wisp_schema::{DataType, NodeDeclaration, NodePort};

/// Routes flow to `true` or `false` on its condition.
pub struct Branch;

#[async_trait]
impl Node for Branch {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("branch")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("true")
      .flow_output("false")
      .cancellable()
      .input(NodePort::new("condition", DataType::Bool))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    if ctx.input_bool("condition").unwrap_or(false) {
      ctx.continue_flow("true").await
    } else {
      ctx.continue_flow("false").await
    }
  }
}

/// Fires `then_0 .. then_{n-1}` one after another.
pub struct Sequence {
  outputs: usize,
}

impl Sequence {
  pub fn new(outputs: usize) -> Self {
    Self {
      outputs: outputs.max(1),
    }
  }

  fn output_name(index: usize) -> String {
    format!("then_{}", index)
  }
}

#[async_trait]
impl Node for Sequence {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("sequence<{}>", self.outputs))
  }

  fn declare(&self) -> NodeDeclaration {
    (0..self.outputs).fold(
      NodeDeclaration::new(self.type_name()).flow_input(),
      |decl, index| decl.flow_output(Self::output_name(index)),
    )
    .cancellable()
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    for index in 0..self.outputs {
      ctx.checkpoint()?;
      ctx.continue_flow(&Self::output_name(index)).await?;
    }
    Ok(())
  }
}

/// Counts from `start` (inclusive) to `end` (exclusive), running `body` in a
/// fresh scope per iteration, then fires `completed`.
///
/// Value nodes fed by `index` are re-evaluated every iteration because their
/// memory lives in the iteration scope.
pub struct ForLoop;

#[async_trait]
impl Node for ForLoop {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("for_loop")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("body")
      .flow_output("completed")
      .cancellable()
      .input(NodePort::new("start", DataType::Int))
      .input(NodePort::new("end", DataType::Int))
      .output(NodePort::new("index", DataType::Int))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let start = ctx.input_int("start").unwrap_or(0);
    let end = ctx.input_int("end").unwrap_or(0);
    debug!(node_id = %ctx.node_id(), start, end, "loop_started");

    for index in start..end {
      ctx.checkpoint()?;
      ctx.set_output("index", index)?;
      ctx.continue_flow_scoped("body").await?;
    }
    ctx.continue_flow("completed").await
  }
}

/// Waits `seconds`, then continues. Cancelling the pass cuts the wait short.
pub struct Delay;

#[async_trait]
impl Node for Delay {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("delay")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
      .input(NodePort::new("seconds", DataType::Float).with_default(1.0))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let seconds = ctx.input_float("seconds").unwrap_or(1.0);
    if !seconds.is_finite() || seconds < 0.0 {
      return Err(NodeError::failed(format!("invalid delay {}", seconds)));
    }
    ctx.sleep(Duration::from_secs_f64(seconds)).await?;
    ctx.continue_flow("next").await
  }
}

/// Logs its message and keeps every line it printed.
#[derive(Default)]
pub struct Log {
  lines: Mutex<Vec<String>>,
}

impl Log {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn lines(&self) -> Vec<String> {
    self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

#[async_trait]
impl Node for Log {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("log")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
      .input(NodePort::new("message", DataType::Any))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let message = ctx.input("message").to_string();
    info!(node_id = %ctx.node_id(), message = %message, "log_node");
    self
      .lines
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(message);
    ctx.continue_flow("next").await
  }
}

/// Assigns a graph variable, then continues.
pub struct SetVariable {
  name: String,
}

impl SetVariable {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

#[async_trait]
impl Node for SetVariable {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("set_variable")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
      .input(NodePort::new("value", DataType::Any))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx.input("value").clone();
    ctx.set_variable(&self.name, value)?;
    ctx.continue_flow("next").await
  }
}
