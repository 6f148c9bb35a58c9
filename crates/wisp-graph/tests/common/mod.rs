//! Node types shared by the graph integration tests.

#![allow(dead_code)]

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use wisp_config::EngineConfig;
use wisp_graph::{Graph, GraphEvent, Node, NodeContext, NodeError, async_trait};
use wisp_schema::{DataType, EventKind, NodeDeclaration, NodePort, Value};

pub fn create_test_graph() -> Graph {
  Graph::new(EngineConfig::without_updates())
}

/// Shared, ordered record of what ran.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
  pub fn push(&self, entry: impl Into<String>) {
    self.0.lock().unwrap().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().unwrap().clone()
  }
}

/// Flow trigger fired by parameter events.
pub struct FlowTrigger {
  pub label: String,
  pub log: Recorder,
}

impl FlowTrigger {
  pub fn new(label: &str, log: &Recorder) -> Self {
    Self {
      label: label.to_string(),
      log: log.clone(),
    }
  }
}

#[async_trait]
impl Node for FlowTrigger {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_flow_trigger")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable()
      .handles(EventKind::ParameterReceived)
  }

  async fn on_event(&self, _ctx: &mut NodeContext, _event: &GraphEvent) -> Result<bool, NodeError> {
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.log.push(&self.label);
    ctx.continue_flow("next").await
  }
}

/// Flow-through node that records its label.
pub struct Step {
  pub label: String,
  pub log: Recorder,
}

impl Step {
  pub fn new(label: &str, log: &Recorder) -> Self {
    Self {
      label: label.to_string(),
      log: log.clone(),
    }
  }
}

#[async_trait]
impl Node for Step {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_step")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.log.push(&self.label);
    ctx.continue_flow("next").await
  }
}

/// Value source whose output can be changed by the test.
pub struct Source {
  pub data_type: DataType,
  pub value: RwLock<Value>,
  pub calls: AtomicUsize,
}

impl Source {
  pub fn new(data_type: DataType, value: impl Into<Value>) -> Arc<Self> {
    Arc::new(Self {
      data_type,
      value: RwLock::new(value.into()),
      calls: AtomicUsize::new(0),
    })
  }

  pub fn set(&self, value: impl Into<Value>) {
    *self.value.write().unwrap() = value.into();
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Node for Source {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("test_source<{}>", self.data_type))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name()).output(NodePort::new("value", self.data_type.clone()))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let value = self.value.read().unwrap().clone();
    ctx.set_output("value", value)
  }
}

/// `sum = a + b`, counting invocations.
#[derive(Default)]
pub struct Adder {
  pub calls: AtomicUsize,
}

impl Adder {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Node for Adder {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_adder")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("a", DataType::Float))
      .input(NodePort::new("b", DataType::Float))
      .output(NodePort::new("sum", DataType::Float))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let sum = ctx.input_float("a").unwrap_or(0.0) + ctx.input_float("b").unwrap_or(0.0);
    ctx.set_output("sum", sum)
  }
}

/// `out = in * 2`, counting invocations.
#[derive(Default)]
pub struct Doubler {
  pub calls: AtomicUsize,
}

#[async_trait]
impl Node for Doubler {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_doubler")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("in", DataType::Int))
      .output(NodePort::new("out", DataType::Int))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let doubled = ctx.input_int("in").unwrap_or(0) * 2;
    ctx.set_output("out", doubled)
  }
}

/// Reactive value sink recording every value it receives.
pub struct Sink {
  pub data_type: DataType,
  pub reactive: bool,
  pub seen: Mutex<Vec<Value>>,
}

impl Sink {
  pub fn new(data_type: DataType) -> Arc<Self> {
    Arc::new(Self {
      data_type,
      reactive: true,
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn passive(data_type: DataType) -> Arc<Self> {
    Arc::new(Self {
      data_type,
      reactive: false,
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn seen(&self) -> Vec<Value> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl Node for Sink {
  fn type_name(&self) -> Cow<'static, str> {
    let kind = if self.reactive { "reactive" } else { "passive" };
    Cow::Owned(format!("test_sink<{},{}>", self.data_type, kind))
  }

  fn declare(&self) -> NodeDeclaration {
    let port = NodePort::new("value", self.data_type.clone());
    let port = if self.reactive { port.reactive() } else { port };
    NodeDeclaration::new(self.type_name()).input(port)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.seen.lock().unwrap().push(ctx.input("value").clone());
    Ok(())
  }
}

/// Flow trigger whose body sleeps, recording start, end or cancellation.
pub struct Slow {
  pub log: Recorder,
  pub duration: Duration,
  pub multi_flow: bool,
}

struct Pending<'a> {
  log: &'a Recorder,
  done: bool,
}

impl Drop for Pending<'_> {
  fn drop(&mut self) {
    if !self.done {
      self.log.push("cancelled");
    }
  }
}

#[async_trait]
impl Node for Slow {
  fn type_name(&self) -> Cow<'static, str> {
    if self.multi_flow {
      Cow::Borrowed("test_slow_multi")
    } else {
      Cow::Borrowed("test_slow")
    }
  }

  fn declare(&self) -> NodeDeclaration {
    let decl = NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable();
    if self.multi_flow { decl.multi_flow() } else { decl }
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.log.push("start");
    let mut pending = Pending {
      log: &self.log,
      done: false,
    };
    ctx.sleep(self.duration).await?;
    pending.done = true;
    self.log.push("end");
    Ok(())
  }
}

/// Flow trigger that loops `count` times over a scoped body, then fires `done`.
pub struct Repeat {
  pub count: i64,
}

#[async_trait]
impl Node for Repeat {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_repeat")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("body")
      .flow_output("done")
      .cancellable()
      .output(NodePort::new("index", DataType::Int))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    for index in 0..self.count {
      ctx.set_output("index", index)?;
      ctx.continue_flow_scoped("body").await?;
    }
    ctx.continue_flow("done").await
  }
}

/// Flow node adding its input into a global-store total and recording it.
pub struct Accumulate {
  pub seen: Mutex<Vec<Value>>,
}

#[async_trait]
impl Node for Accumulate {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_accumulate")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
      .input(NodePort::new("value", DataType::Int))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx.input_int("value").unwrap_or(0);
    self.seen.lock().unwrap().push(Value::Int(value));
    ctx.update_stored("total", |current| {
      Value::Int(current.and_then(Value::as_int).unwrap_or(0) + value)
    });
    ctx.continue_flow("next").await
  }
}

/// Flow trigger that always fails.
pub struct Failing;

#[async_trait]
impl Node for Failing {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_failing")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable()
  }

  async fn process(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
    Err(NodeError::failed("boom"))
  }
}

/// Handles stop; its body would record "pass" if a pass were ever started.
pub struct StopWatcher {
  pub log: Recorder,
}

#[async_trait]
impl Node for StopWatcher {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_stop_watcher")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable()
      .handles(EventKind::Stop)
  }

  async fn on_event(&self, _ctx: &mut NodeContext, _event: &GraphEvent) -> Result<bool, NodeError> {
    self.log.push("stopped");
    Ok(true)
  }

  async fn process(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.log.push("pass");
    Ok(())
  }
}

/// Writes a global-store entry on every pass.
pub struct Marker;

#[async_trait]
impl Node for Marker {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_marker")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("next")
      .cancellable()
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    ctx.store("marked", true);
    Ok(())
  }
}

/// Sums a variable-size list of floats.
pub struct Total;

#[async_trait]
impl Node for Total {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_total")
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

/// Reactive sink whose body holds its worker thread without yielding.
pub struct Blocking {
  pub log: Recorder,
  pub duration: Duration,
}

#[async_trait]
impl Node for Blocking {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_blocking")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name()).input(NodePort::new("value", DataType::Float).reactive())
  }

  async fn process(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
    self.log.push("start");
    std::thread::sleep(self.duration);
    self.log.push("end");
    Ok(())
  }
}

/// Flow-through node that sleeps before recording its label.
pub struct SlowStep {
  pub label: String,
  pub log: Recorder,
  pub duration: Duration,
}

impl SlowStep {
  pub fn new(label: &str, log: &Recorder, duration: Duration) -> Self {
    Self {
      label: label.to_string(),
      log: log.clone(),
      duration,
    }
  }
}

#[async_trait]
impl Node for SlowStep {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_slow_step")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_input()
      .flow_output("next")
      .cancellable()
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    ctx.sleep(self.duration).await?;
    self.log.push(&self.label);
    ctx.continue_flow("next").await
  }
}

/// Value node that always fails.
pub struct BrokenValue;

#[async_trait]
impl Node for BrokenValue {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("test_broken_value")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .input(NodePort::new("in", DataType::Float))
      .output(NodePort::new("out", DataType::Float))
  }

  async fn process(&self, _ctx: &mut NodeContext) -> Result<(), NodeError> {
    Err(NodeError::failed("broken"))
  }
}
