//! Execution contexts: per-dispatch memory, keyed store, call stack and
//! cancellation.
//!
//! Contexts form a linked chain. A child created for a nested scope (loop
//! body, fan-out) reads through to its ancestors for anything it does not
//! hold itself, but every write lands in the context it was made on. When a
//! child is dropped its memory is gone, while the parent is untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use wisp_schema::Value;

use crate::ids::NodeId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Output values of one node within one context, one entry per output port.
/// A variable-size tail is a single [`Value::Array`] entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMemory {
  pub outputs: Vec<Value>,
}

/// Nodes executing anywhere inside one flow pass, across all of its scopes.
#[derive(Debug, Default)]
pub(crate) struct PassTrail {
  nodes: Mutex<Vec<NodeId>>,
}

impl PassTrail {
  pub fn contains(&self, node: NodeId) -> bool {
    lock(&self.nodes).contains(&node)
  }

  fn push(&self, node: NodeId) {
    lock(&self.nodes).push(node);
  }

  fn remove(&self, node: NodeId) {
    let mut nodes = lock(&self.nodes);
    if let Some(position) = nodes.iter().rposition(|n| *n == node) {
      nodes.remove(position);
    }
  }
}

#[derive(Debug)]
pub struct ExecutionContext {
  parent: Option<Arc<ExecutionContext>>,
  cancel: CancellationToken,
  depth: usize,
  memory: Mutex<HashMap<NodeId, NodeMemory>>,
  keyed: Mutex<HashMap<String, Value>>,
  call_stack: Mutex<Vec<NodeId>>,
  trail: Option<Arc<PassTrail>>,
}

impl ExecutionContext {
  fn with_parent(
    parent: Option<Arc<ExecutionContext>>,
    cancel: CancellationToken,
    trail: Option<Arc<PassTrail>>,
  ) -> Arc<Self> {
    let depth = parent.as_ref().map(|p| p.depth + 1).unwrap_or(0);
    Arc::new(Self {
      parent,
      cancel,
      depth,
      memory: Mutex::new(HashMap::new()),
      keyed: Mutex::new(HashMap::new()),
      call_stack: Mutex::new(Vec::new()),
      trail,
    })
  }

  /// A top-level context owning `cancel`.
  pub fn root(cancel: CancellationToken) -> Arc<Self> {
    Self::with_parent(None, cancel, None)
  }

  /// A nested scope sharing this context's cancellation.
  pub fn child(self: &Arc<Self>) -> Arc<Self> {
    Self::with_parent(Some(self.clone()), self.cancel.clone(), self.trail.clone())
  }

  /// A nested scope with its own cancellation source.
  pub fn child_with_token(self: &Arc<Self>, cancel: CancellationToken) -> Arc<Self> {
    Self::with_parent(Some(self.clone()), cancel, self.trail.clone())
  }

  /// The outermost scope of a flow pass. Every node entered in it or in its
  /// descendants is recorded on `trail`.
  pub(crate) fn for_pass(
    parent: Option<&Arc<Self>>,
    cancel: CancellationToken,
    trail: Arc<PassTrail>,
  ) -> Arc<Self> {
    Self::with_parent(parent.cloned(), cancel, Some(trail))
  }

  pub fn parent(&self) -> Option<&Arc<ExecutionContext>> {
    self.parent.as_ref()
  }

  /// Nesting depth; a root context is 0.
  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Walk this context and its ancestors, nearest first, returning the first hit.
  fn find<T>(&self, mut f: impl FnMut(&ExecutionContext) -> Option<T>) -> Option<T> {
    let mut current = Some(self);
    while let Some(context) = current {
      if let Some(found) = f(context) {
        return Some(found);
      }
      current = context.parent.as_deref();
    }
    None
  }

  /// Whether `node` has memory anywhere in the chain.
  pub fn has_memory(&self, node: NodeId) -> bool {
    self.find(|c| lock(&c.memory).contains_key(&node).then_some(())).is_some()
  }

  pub fn has_local_memory(&self, node: NodeId) -> bool {
    lock(&self.memory).contains_key(&node)
  }

  /// Snapshot of the nearest memory for `node`.
  pub fn memory(&self, node: NodeId) -> Option<NodeMemory> {
    self.find(|c| lock(&c.memory).get(&node).cloned())
  }

  /// Create memory for `node` in this context unless it already holds some.
  ///
  /// Returns `true` when memory was created.
  pub fn init_memory(&self, node: NodeId, defaults: Vec<Value>) -> bool {
    let mut memory = lock(&self.memory);
    if memory.contains_key(&node) {
      return false;
    }
    memory.insert(node, NodeMemory { outputs: defaults });
    true
  }

  /// Read output `port` of `node`, nearest context first.
  pub fn read_output(&self, node: NodeId, port: usize) -> Option<Value> {
    self.find(|c| {
      lock(&c.memory)
        .get(&node)
        .map(|m| m.outputs.get(port).cloned())
    })
    .flatten()
  }

  /// Read one element of a variable-size output tail.
  pub fn read_output_element(&self, node: NodeId, port: usize, index: usize) -> Option<Value> {
    match self.read_output(node, port)? {
      Value::Array(items) => items.get(index).cloned(),
      _ => None,
    }
  }

  /// Write output `port` of `node` in this context.
  pub fn write_output(&self, node: NodeId, port: usize, value: Value) {
    let mut memory = lock(&self.memory);
    let outputs = &mut memory.entry(node).or_default().outputs;
    if outputs.len() <= port {
      outputs.resize(port + 1, Value::None);
    }
    outputs[port] = value;
  }

  /// Write one element of a variable-size output tail in this context.
  ///
  /// Returns `false` when the tail does not have that element.
  pub fn write_output_element(&self, node: NodeId, port: usize, index: usize, value: Value) -> bool {
    let mut memory = lock(&self.memory);
    let slot = memory
      .get_mut(&node)
      .and_then(|m| m.outputs.get_mut(port))
      .and_then(|v| match v {
        Value::Array(items) => items.get_mut(index),
        _ => None,
      });
    match slot {
      Some(slot) => {
        *slot = value;
        true
      }
      None => false,
    }
  }

  /// Keyed store lookup, nearest context first.
  pub fn keyed_get(&self, key: &str) -> Option<Value> {
    self.find(|c| lock(&c.keyed).get(key).cloned())
  }

  /// Keyed store write; visible to this context and its descendants only.
  pub fn keyed_set(&self, key: impl Into<String>, value: Value) {
    lock(&self.keyed).insert(key.into(), value);
  }

  /// Whether `node` is executing anywhere in the chain.
  pub fn in_progress(&self, node: NodeId) -> bool {
    self
      .find(|c| lock(&c.call_stack).contains(&node).then_some(()))
      .is_some()
  }

  /// Mark `node` as executing. Returns `false` if it already is, which
  /// means the caller reached it through a cycle.
  pub fn enter(&self, node: NodeId) -> bool {
    if self.in_progress(node) {
      return false;
    }
    lock(&self.call_stack).push(node);
    if let Some(trail) = &self.trail {
      trail.push(node);
    }
    true
  }

  pub fn exit(&self, node: NodeId) {
    let mut stack = lock(&self.call_stack);
    if let Some(position) = stack.iter().rposition(|n| *n == node) {
      stack.remove(position);
      if let Some(trail) = &self.trail {
        trail.remove(node);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_child_reads_through_parent() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();
    root.init_memory(node, vec![Value::Float(1.0)]);
    root.keyed_set("index", Value::Int(4));

    let child = root.child();
    assert!(child.has_memory(node));
    assert!(!child.has_local_memory(node));
    assert_eq!(child.read_output(node, 0), Some(Value::Float(1.0)));
    assert_eq!(child.keyed_get("index"), Some(Value::Int(4)));
    assert_eq!(child.depth(), 1);
  }

  #[test]
  fn test_child_writes_stay_local() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();

    {
      let child = root.child();
      child.init_memory(node, vec![Value::Int(0)]);
      child.write_output(node, 0, Value::Int(9));
      child.keyed_set("scratch", Value::Bool(true));
      assert_eq!(child.read_output(node, 0), Some(Value::Int(9)));
    }

    assert!(!root.has_memory(node));
    assert_eq!(root.keyed_get("scratch"), None);
  }

  #[test]
  fn test_siblings_do_not_see_each_other() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();
    let first = root.child();
    let second = root.child();

    first.write_output(node, 0, Value::Int(1));
    assert!(!second.has_memory(node));
  }

  #[test]
  fn test_init_memory_keeps_existing() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();
    assert!(root.init_memory(node, vec![Value::Int(0)]));
    root.write_output(node, 0, Value::Int(5));
    assert!(!root.init_memory(node, vec![Value::Int(0)]));
    assert_eq!(root.read_output(node, 0), Some(Value::Int(5)));
  }

  #[test]
  fn test_element_writes() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();
    root.init_memory(node, vec![Value::Array(vec![Value::Int(0); 3])]);

    assert!(root.write_output_element(node, 0, 2, Value::Int(7)));
    assert!(!root.write_output_element(node, 0, 3, Value::Int(7)));
    assert_eq!(root.read_output_element(node, 0, 2), Some(Value::Int(7)));
    assert_eq!(root.read_output_element(node, 0, 0), Some(Value::Int(0)));
  }

  #[test]
  fn test_call_stack_detects_reentry() {
    let root = ExecutionContext::root(CancellationToken::new());
    let node = NodeId::new();
    assert!(root.enter(node));

    let child = root.child();
    assert!(child.in_progress(node));
    assert!(!child.enter(node));

    root.exit(node);
    assert!(child.enter(node));
  }

  #[test]
  fn test_pass_trail_spans_nested_scopes() {
    let trail = Arc::new(PassTrail::default());
    let pass = ExecutionContext::for_pass(None, CancellationToken::new(), trail.clone());
    let body = pass.child().child();
    let node = NodeId::new();

    assert!(body.enter(node));
    assert!(trail.contains(node));
    body.exit(node);
    assert!(!trail.contains(node));

    let outside = ExecutionContext::root(CancellationToken::new());
    assert!(outside.enter(node));
    assert!(!trail.contains(node));
  }

  #[test]
  fn test_cancellation_is_shared_with_child() {
    let token = CancellationToken::new();
    let root = ExecutionContext::root(token.clone());
    let child = root.child();
    let own = root.child_with_token(token.child_token());

    token.cancel();
    assert!(child.is_cancelled());
    assert!(own.is_cancelled());
  }
}
