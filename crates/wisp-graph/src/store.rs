//! Global per-node store.
//!
//! Entries are keyed by `(node id, handle)` and live for one graph run; the
//! graph clears them on stop. Concurrent passes writing the same entry
//! resolve last-writer-wins. Each call is atomic, and [`GlobalStore::update`]
//! gives an atomic read-modify-write for callers that need one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use wisp_schema::Value;

use crate::ids::NodeId;

#[derive(Debug, Default)]
pub struct GlobalStore {
  entries: Mutex<HashMap<(NodeId, String), Value>>,
}

impl GlobalStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<(NodeId, String), Value>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, node: NodeId, handle: &str) -> Option<Value> {
    self.entries().get(&(node, handle.to_string())).cloned()
  }

  /// Store a value, returning the previous one.
  pub fn set(&self, node: NodeId, handle: impl Into<String>, value: Value) -> Option<Value> {
    self.entries().insert((node, handle.into()), value)
  }

  /// Replace the entry with `f(current)` under one lock and return the new value.
  pub fn update(
    &self,
    node: NodeId,
    handle: impl Into<String>,
    f: impl FnOnce(Option<&Value>) -> Value,
  ) -> Value {
    let mut entries = self.entries();
    let key = (node, handle.into());
    let next = f(entries.get(&key));
    entries.insert(key, next.clone());
    next
  }

  /// Drop every entry owned by `node`.
  pub fn remove_node(&self, node: NodeId) {
    self.entries().retain(|(owner, _), _| *owner != node);
  }

  pub fn clear(&self) {
    self.entries().clear();
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
