//! External events offered to capability-declaring nodes.

use serde::{Deserialize, Serialize};
use wisp_schema::{EventKind, Value};

/// An event delivered to a running graph.
///
/// Tagged by `type` so hosts can feed JSON directly:
///
/// ```json
/// { "type": "parameter_received", "name": "Gesture", "value": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
  Start,
  Stop,
  ParameterReceived { name: String, value: Value },
  AvatarChanged { avatar_id: String },
  SpeechPartial { text: String },
  SpeechFinal { text: String },
  InstanceJoined { user: String },
  InstanceLeft { user: String },
  VariableChanged { name: String },
}

impl GraphEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      GraphEvent::Start => EventKind::Start,
      GraphEvent::Stop => EventKind::Stop,
      GraphEvent::ParameterReceived { .. } => EventKind::ParameterReceived,
      GraphEvent::AvatarChanged { .. } => EventKind::AvatarChanged,
      GraphEvent::SpeechPartial { .. } => EventKind::SpeechPartial,
      GraphEvent::SpeechFinal { .. } => EventKind::SpeechFinal,
      GraphEvent::InstanceJoined { .. } => EventKind::InstanceJoined,
      GraphEvent::InstanceLeft { .. } => EventKind::InstanceLeft,
      GraphEvent::VariableChanged { .. } => EventKind::VariableChanged,
    }
  }
}
