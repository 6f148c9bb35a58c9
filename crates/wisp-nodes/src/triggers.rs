//! Event-driven nodes.
//!
//! Flow triggers (`OnStart`, `OnParameter`, ...) have flow outputs and no
//! flow input. When one accepts an event it stashes the event data in the
//! keyed store of the event's context; the pass started for it reads the
//! data back in `process` and exposes it on the trigger's outputs.
//!
//! `ParameterSource` is a pure value node instead: it keeps the latest
//! parameter in the global store and dispatches its trigger tree.

use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};
use wisp_graph::{GraphEvent, Node, NodeContext, NodeError};
use wisp_schema::{DataType, EventKind, NodeDeclaration, NodePort, Value};

fn event_key(ctx: &NodeContext, field: &str) -> String {
  format!("{}:{}", ctx.node_id(), field)
}

fn trigger(type_name: &str) -> NodeDeclaration {
  NodeDeclaration::new(type_name)
    .flow_output("next")
    .cancellable()
}

/// Fires once when the graph starts.
pub struct OnStart;

#[async_trait]
impl Node for OnStart {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_start")
  }

  fn declare(&self) -> NodeDeclaration {
    trigger("on_start").handles(EventKind::Start)
  }

  async fn on_event(&self, _ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    Ok(matches!(event, GraphEvent::Start))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    ctx.continue_flow("next").await
  }
}

/// Fires when the named parameter arrives, exposing its value.
pub struct OnParameter {
  name: String,
}

impl OnParameter {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

#[async_trait]
impl Node for OnParameter {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_parameter")
  }

  fn declare(&self) -> NodeDeclaration {
    trigger("on_parameter")
      .output(NodePort::new("value", DataType::Any))
      .handles(EventKind::ParameterReceived)
  }

  async fn on_event(&self, ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    let GraphEvent::ParameterReceived { name, value } = event else {
      return Ok(false);
    };
    if *name != self.name {
      return Ok(false);
    }
    ctx.set_keyed(&event_key(ctx, "value"), value.clone());
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx.keyed(&event_key(ctx, "value")).unwrap_or_default();
    ctx.set_output("value", value)?;
    ctx.continue_flow("next").await
  }
}

/// Latest value of a named parameter, as a plain value node.
///
/// Values that cannot be converted to the declared type are ignored.
pub struct ParameterSource {
  name: String,
  data_type: DataType,
}

impl ParameterSource {
  pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
    Self {
      name: name.into(),
      data_type,
    }
  }
}

#[async_trait]
impl Node for ParameterSource {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Owned(format!("parameter<{}>", self.data_type))
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .output(NodePort::new("value", self.data_type.clone()))
      .handles(EventKind::ParameterReceived)
  }

  async fn on_event(&self, ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    let GraphEvent::ParameterReceived { name, value } = event else {
      return Ok(false);
    };
    if *name != self.name {
      return Ok(false);
    }
    let Some(value) = value.cast_to(&self.data_type) else {
      debug!(node_id = %ctx.node_id(), parameter = %name, "parameter_type_mismatch");
      return Ok(false);
    };
    let previous = ctx.store("value", value.clone());
    Ok(previous.as_ref() != Some(&value))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx
      .stored("value")
      .unwrap_or_else(|| self.data_type.default_value());
    ctx.set_output("value", value)
  }
}

/// Fires when the local avatar changes.
pub struct OnAvatarChanged;

#[async_trait]
impl Node for OnAvatarChanged {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_avatar_changed")
  }

  fn declare(&self) -> NodeDeclaration {
    trigger("on_avatar_changed")
      .output(NodePort::new("avatar_id", DataType::Text))
      .handles(EventKind::AvatarChanged)
  }

  async fn on_event(&self, ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    let GraphEvent::AvatarChanged { avatar_id } = event else {
      return Ok(false);
    };
    ctx.set_keyed(&event_key(ctx, "avatar_id"), avatar_id.as_str());
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let avatar_id = ctx.keyed(&event_key(ctx, "avatar_id")).unwrap_or_default();
    ctx.set_output("avatar_id", avatar_id)?;
    ctx.continue_flow("next").await
  }
}

/// Fires on speech recognition results. Partial results only fire when
/// `include_partial` is set.
pub struct OnSpeech {
  include_partial: bool,
}

impl OnSpeech {
  pub fn new(include_partial: bool) -> Self {
    Self { include_partial }
  }
}

#[async_trait]
impl Node for OnSpeech {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_speech")
  }

  fn declare(&self) -> NodeDeclaration {
    trigger("on_speech")
      .output(NodePort::new("text", DataType::Text))
      .output(NodePort::new("final", DataType::Bool))
      .handles(EventKind::SpeechPartial)
      .handles(EventKind::SpeechFinal)
  }

  async fn on_event(&self, ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    let (text, is_final) = match event {
      GraphEvent::SpeechFinal { text } => (text, true),
      GraphEvent::SpeechPartial { text } if self.include_partial => (text, false),
      _ => return Ok(false),
    };
    ctx.set_keyed(&event_key(ctx, "text"), text.as_str());
    ctx.set_keyed(&event_key(ctx, "final"), is_final);
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let text = ctx.keyed(&event_key(ctx, "text")).unwrap_or_default();
    let is_final = ctx
      .keyed(&event_key(ctx, "final"))
      .unwrap_or(Value::Bool(false));
    ctx.set_output("text", text)?;
    ctx.set_output("final", is_final)?;
    ctx.continue_flow("next").await
  }
}

/// Fires `joined` or `left` when a user enters or leaves the instance.
pub struct OnInstanceEvent;

#[async_trait]
impl Node for OnInstanceEvent {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_instance_event")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("joined")
      .flow_output("left")
      .cancellable()
      .output(NodePort::new("user", DataType::Text))
      .handles(EventKind::InstanceJoined)
      .handles(EventKind::InstanceLeft)
  }

  async fn on_event(&self, ctx: &mut NodeContext, event: &GraphEvent) -> Result<bool, NodeError> {
    let (user, joined) = match event {
      GraphEvent::InstanceJoined { user } => (user, true),
      GraphEvent::InstanceLeft { user } => (user, false),
      _ => return Ok(false),
    };
    ctx.set_keyed(&event_key(ctx, "user"), user.as_str());
    ctx.set_keyed(&event_key(ctx, "joined"), joined);
    Ok(true)
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let user = ctx.keyed(&event_key(ctx, "user")).unwrap_or_default();
    let joined = ctx
      .keyed(&event_key(ctx, "joined"))
      .and_then(|v| v.as_bool())
      .unwrap_or(false);
    ctx.set_output("user", user)?;
    if joined {
      ctx.continue_flow("joined").await
    } else {
      ctx.continue_flow("left").await
    }
  }
}

/// Fires `changed` when its reactive input differs from the last value it
/// saw. The first value seen counts as a change.
pub struct OnChanged;

#[async_trait]
impl Node for OnChanged {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("on_changed")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name())
      .flow_output("changed")
      .cancellable()
      .input(NodePort::new("value", DataType::Any).reactive())
      .output(NodePort::new("previous", DataType::Any))
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let current = ctx.input("value").clone();
    let previous = ctx.store("last", current.clone());
    if previous.as_ref() == Some(&current) {
      return Ok(());
    }
    ctx.set_output("previous", previous.unwrap_or_default())?;
    ctx.continue_flow("changed").await
  }
}

/// Reactive sink that shows whatever reaches it.
#[derive(Default)]
pub struct Display {
  shown: Mutex<Vec<Value>>,
}

impl Display {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every value displayed so far, oldest first.
  pub fn history(&self) -> Vec<Value> {
    self.shown.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn latest(&self) -> Option<Value> {
    self
      .shown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .last()
      .cloned()
  }
}

#[async_trait]
impl Node for Display {
  fn type_name(&self) -> Cow<'static, str> {
    Cow::Borrowed("display")
  }

  fn declare(&self) -> NodeDeclaration {
    NodeDeclaration::new(self.type_name()).input(NodePort::new("value", DataType::Any).reactive())
  }

  async fn process(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
    let value = ctx.input("value").clone();
    info!(node_id = %ctx.node_id(), value = %value, "display_updated");
    ctx.store("text", value.to_string());
    self
      .shown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(value);
    Ok(())
  }
}
