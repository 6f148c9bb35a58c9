//! Nodes driven by the update loop.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;
use wisp_graph::{Node, NodeContext, NodeError};
use wisp_schema::{DataType, NodeDeclaration, NodePort, Value};

/// Seconds since the node was created, in steps of `resolution`.
///
/// Active update: each tick recomputes the value and dispatches only when
/// it moved to a new step.
pub struct Clock {
  epoch: Instant,
  resolution: Duration,
}

impl Clock {
  pub fn new(resolution: Duration) -> Self {
    Self {
      epoch: Instant::now(),
      resolution: resolution.max(Duration::from_millis(1)),
    }
  }

  fn now(&self) -> f64 {
    let steps = self.epoch.elapsed().as_nanos() / self.resolution.as_nanos();
    steps as f64 * self.resolution.as_secs_f64()
  }
}

impl Default for Clock {
  fn default() -> Self {
    Self::new(Duration::from_secs(1))
  }
}

#[async_trait]
impl Node for Clock {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("clock")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .output(NodePort::new("seconds", DataType::Float))
      .active_update()
  }

  async fn on_update(&self, ctx: &mut NodeContext) -> Result<bool, NodeError> {
    let now = Value::Float(self.now());
    let previous = ctx.store("seconds", now.clone());
    Ok(previous.as_ref() != Some(&now))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let seconds = ctx
      .stored("seconds")
      .unwrap_or_else(|| Value::Float(self.now()));
    ctx.set_output("seconds", seconds)
  }
}

/// Flow trigger firing every `interval` seconds while the graph runs.
///
/// The first pulse comes one interval after the first tick.
pub struct Pulse {
  epoch: Instant,
}

impl Pulse {
  pub fn new() -> Self {
    Self {
      epoch: Instant::now(),
    }
  }
}

impl Default for Pulse {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Node for Pulse {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("pulse")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable()
      .input(NodePort::new("interval", DataType::Float).with_default(1.0))
      .output(NodePort::new("count", DataType::Int))
      .active_update()
  }

  async fn on_update(&self, ctx: &mut NodeContext) -> Result<bool, NodeError> {
    let interval = ctx.input_float("interval").unwrap_or(1.0);
    if !interval.is_finite() || interval <= 0.0 {
      return Ok(false);
    }

    let now = self.epoch.elapsed().as_secs_f64();
    let Some(last) = ctx.stored("last_fire").and_then(|v| v.as_float()) else {
      ctx.store("last_fire", now);
      return Ok(false);
    };
    if now - last < interval {
      return Ok(false);
    }

    ctx.store("last_fire", now);
    let count = ctx.update_stored("count", |current| {
      Value::Int(current.and_then(Value::as_int).unwrap_or(0) + 1)
    });
    trace!(node_id = %ctx.node_id(), count = %count, "pulse");
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let count = ctx.stored("count").unwrap_or(Value::Int(0));
    ctx.set_output("count", count)?;
    ctx.continue_flow("next").await
  }
}

/// Counts update ticks in the global store. Never propagates on its own;
/// readers see the count the next time they evaluate it.
pub struct TickCounter;

#[async_trait]
impl Node for TickCounter {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("tick_counter")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .output(NodePort::new("ticks", DataType::Int))
      .passive_update()
  }

  fn on_passive_update(&self, ctx: &NodeContext) {
    ctx.update_stored("ticks", |current| {
      Value::Int(current.and_then(Value::as_int).unwrap_or(0) + 1)
    });
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let ticks = ctx.stored("ticks").unwrap_or(Value::Int(0));
    ctx.set_output("ticks", ticks)
  }
}
