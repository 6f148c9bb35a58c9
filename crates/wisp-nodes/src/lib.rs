//! Built-in nodes for wisp graphs.
//!
//! ## Values
//! - [`Constant`], [`Add`], [`Multiply`]
//! - [`Sum`] (variable-size inputs), [`Split`] (variable-size outputs)
//!
//! ## Flow control
//! - [`Branch`], [`Sequence`], [`ForLoop`] (scoped body), [`Delay`]
//! - [`Log`], [`SetVariable`]
//!
//! ## Events
//! - [`OnStart`], [`OnParameter`], [`OnAvatarChanged`], [`OnSpeech`],
//!   [`OnInstanceEvent`], [`OnChanged`]
//! - [`ParameterSource`], [`GetVariable`]
//! - [`Display`] (reactive sink)
//!
//! ## Update loop
//! - [`Clock`] (active), [`Pulse`] (active flow trigger), [`TickCounter`]
//!   (passive)

mod flow;
mod triggers;
mod update;
mod values;
mod variables;

use std::sync::Arc;

use wisp_graph::Node;
use wisp_schema::DataType;

pub use flow::{Branch, Delay, ForLoop, Log, Sequence, SetVariable};
pub use triggers::{
  Display, OnAvatarChanged, OnChanged, OnInstanceEvent, OnParameter, OnSpeech, OnStart,
  ParameterSource,
};
pub use update::{Clock, Pulse, TickCounter};
pub use values::{Add, Constant, Multiply, Split, Sum};
pub use variables::GetVariable;

/// One default-configured instance of every built-in node type.
pub fn catalog() -> Vec<Arc<dyn Node>> {
  vec![
    Arc::new(Constant::float(0.0)),
    Arc::new(Add),
    Arc::new(Multiply),
    Arc::new(Sum),
    Arc::new(Split),
    Arc::new(Branch),
    Arc::new(Sequence::new(2)),
    Arc::new(ForLoop),
    Arc::new(Delay),
    Arc::new(Log::new()),
    Arc::new(SetVariable::new("")),
    Arc::new(OnStart),
    Arc::new(OnParameter::new("")),
    Arc::new(ParameterSource::new("", DataType::Float)),
    Arc::new(OnAvatarChanged),
    Arc::new(OnSpeech::new(false)),
    Arc::new(OnInstanceEvent),
    Arc::new(OnChanged),
    Arc::new(Display::new()),
    Arc::new(GetVariable::new("", DataType::Float)),
    Arc::new(Clock::default()),
    Arc::new(Pulse::new()),
    Arc::new(TickCounter),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use wisp_schema::NodeSchema;

  #[test]
  fn test_catalog_declarations_are_valid() {
    for node in catalog() {
      let decl = node.declare();
      assert_eq!(decl.type_name, node.type_name());
      NodeSchema::build(&decl).unwrap();
    }
  }

  #[test]
  fn test_catalog_type_names_are_unique() {
    let mut names: Vec<String> = catalog().iter().map(|n| n.type_name().into_owned()).collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
  }
}
