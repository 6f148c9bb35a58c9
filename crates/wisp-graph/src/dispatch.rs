//! Trigger-tree dispatch, flow passes and lazy input resolution.
//!
//! A value change on node `N` runs as follows:
//!
//! 1. If `N` is itself a trigger, start a flow pass on it.
//! 2. Otherwise walk forward along value edges. A trigger reached through a
//!    reactive input is recorded and the walk stops there; anything else is
//!    walked through.
//! 3. Evaluate every value node on a path to a recorded trigger once, in a
//!    fresh context, farthest from `N` first.
//! 4. Start one independent pass per recorded trigger, each in a child of
//!    that context.
//!
//! Inside a pass, inputs are pulled lazily: reading an input whose source
//! value node has no memory yet in the context chain evaluates the source
//! first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, debug, error, info_span, trace, warn};
use wisp_schema::{PortSide, Value};

use crate::connection::Endpoint;
use crate::context::{ExecutionContext, PassTrail};
use crate::error::{GraphError, NodeError};
use crate::graph::{ActivePass, Graph, lock};
use crate::ids::NodeId;
use crate::node::NodeInstance;
use crate::node_context::NodeContext;
use crate::topology::Topology;

/// Triggers and intermediate value nodes reachable from a changed node.
#[derive(Debug, Default)]
pub(crate) struct TriggerTree {
  /// Each recorded trigger with its path, trigger first, back to the origin.
  pub triggers: Vec<(NodeId, Vec<NodeId>)>,
  /// Value nodes on some path to a trigger, farthest from the origin first.
  pub intermediates: Vec<NodeId>,
}

struct Walk<'a> {
  topology: &'a Topology,
  /// Finished nodes: whether they reach a trigger, and their depth.
  visited: HashMap<NodeId, (bool, usize)>,
  path: Vec<NodeId>,
  triggers: Vec<(NodeId, Vec<NodeId>)>,
}

impl Walk<'_> {
  fn visit(&mut self, node: NodeId, depth: usize) -> bool {
    if let Some((reaches, _)) = self.visited.get(&node) {
      return *reaches;
    }
    // On the current path: a value cycle.
    if self.path.contains(&node) {
      return false;
    }

    self.path.push(node);
    let mut reaches = false;
    let edges: Vec<Endpoint> = self
      .topology
      .outgoing_value(node)
      .map(|c| c.destination)
      .collect();

    for destination in edges {
      let Some(target) = self.topology.node(destination.node) else {
        continue;
      };
      let reactive = target
        .schema
        .slot_port(PortSide::Input, destination.slot, target.input_tail)
        .is_some_and(|port| port.reactive);

      if target.schema.flags.is_trigger && reactive {
        if !self.triggers.iter().any(|(t, _)| *t == destination.node) {
          let mut path = self.path.clone();
          path.push(destination.node);
          path.reverse();
          self.triggers.push((destination.node, path));
        }
        reaches = true;
      } else if self.visit(destination.node, depth + 1) {
        reaches = true;
      }
    }

    self.path.pop();
    self.visited.insert(node, (reaches, depth));
    reaches
  }
}

/// Walk forward from `origin` and collect its trigger tree.
pub(crate) fn collect_trigger_tree(topology: &Topology, origin: NodeId) -> TriggerTree {
  let mut walk = Walk {
    topology,
    visited: HashMap::new(),
    path: Vec::new(),
    triggers: Vec::new(),
  };
  walk.visit(origin, 0);

  let mut intermediates: Vec<(NodeId, usize)> = walk
    .visited
    .iter()
    .filter(|(_, (reaches, _))| *reaches)
    .filter(|(id, _)| topology.node(**id).is_some_and(NodeInstance::is_value_node))
    .map(|(id, (_, depth))| (*id, *depth))
    .collect();
  intermediates.sort_by(|a, b| b.1.cmp(&a.1));

  TriggerTree {
    triggers: walk.triggers,
    intermediates: intermediates.into_iter().map(|(id, _)| id).collect(),
  }
}

/// Pops a node off its context's call stack when the evaluation ends,
/// including when the evaluating future is dropped by cancellation.
struct CallGuard<'a> {
  scope: &'a ExecutionContext,
  node: NodeId,
}

impl Drop for CallGuard<'_> {
  fn drop(&mut self) {
    self.scope.exit(self.node);
  }
}

impl Graph {
  pub fn is_running(&self) -> bool {
    lock(&self.shared.run).running
  }

  pub(crate) fn run_token(&self) -> tokio_util::sync::CancellationToken {
    lock(&self.shared.run).cancel.clone()
  }

  /// A fresh top-level context for the current run.
  pub fn create_context(&self) -> Arc<ExecutionContext> {
    ExecutionContext::root(self.run_token().child_token())
  }

  /// Dispatch the trigger tree rooted at `origin` in the background.
  ///
  /// Ignored while the graph is stopped.
  pub fn dispatch(&self, origin: NodeId) {
    if !self.is_running() {
      trace!(node_id = %origin, "dispatch_ignored");
      return;
    }
    let graph = self.clone();
    self.shared.tracker.spawn(async move {
      match graph.dispatch_from(origin, None).await {
        Ok(()) => {}
        Err(GraphError::Cancelled) => debug!(node_id = %origin, "dispatch_cancelled"),
        Err(e) => error!(node_id = %origin, error = %e, "dispatch_failed"),
      }
    });
  }

  /// Start a flow pass on `node`, optionally inside `parent`.
  ///
  /// Ignored while the graph is stopped.
  pub fn start_flow(&self, node: NodeId, parent: Option<Arc<ExecutionContext>>) {
    if !self.is_running() {
      trace!(node_id = %node, "start_flow_ignored");
      return;
    }
    self.launch_pass(node, parent);
  }

  /// Run the dispatch algorithm for a change on `origin`.
  pub(crate) async fn dispatch_from(
    &self,
    origin: NodeId,
    parent: Option<Arc<ExecutionContext>>,
  ) -> Result<(), GraphError> {
    let instance = self.require(origin)?;
    if instance.schema.flags.is_trigger {
      self.launch_pass(origin, parent);
      return Ok(());
    }

    let tree = collect_trigger_tree(&self.topology(), origin);
    if tree.triggers.is_empty() {
      trace!(node_id = %origin, "no_triggers");
      return Ok(());
    }

    let scope = match parent {
      Some(parent) => parent.child(),
      None => self.create_context(),
    };

    debug!(
      node_id = %origin,
      triggers = tree.triggers.len(),
      intermediates = tree.intermediates.len(),
      "dispatch_started"
    );

    // A failed intermediate only silences the triggers recorded through it.
    let mut failed = HashSet::new();
    for node in tree.intermediates {
      match self.process_node(node, scope.clone()).await {
        Ok(()) => {}
        Err(GraphError::Cancelled) => return Err(GraphError::Cancelled),
        Err(e) => {
          error!(node_id = %node, error = %e, "intermediate_failed");
          failed.insert(node);
        }
      }
    }
    for (trigger, path) in tree.triggers {
      if path.iter().any(|n| failed.contains(n)) {
        debug!(node_id = %trigger, "trigger_skipped");
        continue;
      }
      trace!(node_id = %trigger, path = ?path, "trigger_reached");
      self.launch_pass(trigger, Some(scope.clone()));
    }
    Ok(())
  }

  /// Spawn a pass on `node`, superseding the running one unless the node is
  /// multi-flow. Passes already cancelled by an edit are awaited either way.
  pub(crate) fn launch_pass(&self, node: NodeId, parent: Option<Arc<ExecutionContext>>) {
    let Some(instance) = self.instance(node) else {
      warn!(node_id = %node, "start_flow_unknown_node");
      return;
    };

    let cancel = self.run_token().child_token();
    let trail = Arc::new(PassTrail::default());
    let scope = ExecutionContext::for_pass(parent.as_ref(), cancel.clone(), trail.clone());
    let pass_id = self.shared.next_pass.fetch_add(1, Ordering::Relaxed);
    let span = info_span!(
      "flow_pass",
      node_id = %node,
      type_name = %instance.type_name(),
      pass_id
    );

    let multi_flow = instance.schema.flags.multi_flow;
    let mut passes = lock(&self.shared.passes);
    let (previous, overlapping): (Vec<ActivePass>, Vec<ActivePass>) = passes
      .remove(&node)
      .unwrap_or_default()
      .into_iter()
      .partition(|pass| !multi_flow || pass.cancel.is_cancelled());
    for pass in &previous {
      pass.cancel.cancel();
    }
    if !overlapping.is_empty() {
      passes.insert(node, overlapping);
    }

    let graph = self.clone();
    let token = cancel.clone();
    let handle = self.shared.tracker.spawn(
      async move {
        // The superseded pass must be fully gone before this one reads memory.
        for pass in previous {
          let _ = pass.handle.await;
        }
        debug!("pass_started");
        let result = tokio::select! {
          biased;
          _ = token.cancelled() => Err(GraphError::Cancelled),
          result = graph.process_node(node, scope) => result,
        };
        graph.finish_pass(node, pass_id, result);
      }
      .instrument(span),
    );

    passes.entry(node).or_default().push(ActivePass {
      id: pass_id,
      cancel,
      trail,
      handle,
    });
  }

  fn finish_pass(&self, node: NodeId, pass_id: u64, result: Result<(), GraphError>) {
    {
      let mut passes = lock(&self.shared.passes);
      if let Some(list) = passes.get_mut(&node) {
        list.retain(|pass| pass.id != pass_id);
        if list.is_empty() {
          passes.remove(&node);
        }
      }
    }

    match result {
      Ok(()) => debug!("pass_completed"),
      Err(GraphError::Cancelled) => debug!("pass_cancelled"),
      Err(e) => error!(error = %e, "pass_failed"),
    }
  }

  /// Evaluate `node` in `scope`, honouring memoization.
  pub(crate) fn process_node(
    &self,
    node: NodeId,
    scope: Arc<ExecutionContext>,
  ) -> BoxFuture<'static, Result<(), GraphError>> {
    let graph = self.clone();
    async move {
      if scope.is_cancelled() {
        return Err(GraphError::Cancelled);
      }
      let instance = graph.require(node)?;
      if !scope.enter(node) {
        warn!(node_id = %node, type_name = %instance.type_name(), "cycle_detected");
        return Ok(());
      }
      let _guard = CallGuard {
        scope: &scope,
        node,
      };
      graph.run_node(&instance, &scope).await
    }
    .boxed()
  }

  async fn run_node(
    &self,
    instance: &NodeInstance,
    scope: &Arc<ExecutionContext>,
  ) -> Result<(), GraphError> {
    let inputs = self.backtrack(instance, scope).await?;

    if scope.has_memory(instance.id) && !instance.schema.flags.force_reprocess {
      trace!(node_id = %instance.id, "memoized");
      return Ok(());
    }
    if !instance.behavior.should_process(&inputs) {
      trace!(node_id = %instance.id, "process_skipped");
      return Ok(());
    }

    scope.init_memory(instance.id, instance.output_defaults());
    let mut ctx = NodeContext::new(self.clone(), instance.clone(), scope.clone(), inputs);
    instance
      .behavior
      .process(&mut ctx)
      .await
      .map_err(|e| node_failure(instance, e))
  }

  /// Resolve every value input of `instance`, one value per input port.
  pub(crate) async fn backtrack(
    &self,
    instance: &NodeInstance,
    scope: &Arc<ExecutionContext>,
  ) -> Result<Vec<Value>, GraphError> {
    let ports = &instance.schema.inputs;
    let variable = instance.schema.variable_port(PortSide::Input).is_some();
    let fixed = if variable { ports.len() - 1 } else { ports.len() };

    let mut values = Vec::with_capacity(ports.len());
    for slot in 0..fixed {
      values.push(self.read_slot(instance, slot, scope).await?);
    }
    if variable {
      let mut items = Vec::with_capacity(instance.input_tail);
      for element in 0..instance.input_tail {
        items.push(self.read_slot(instance, fixed + element, scope).await?);
      }
      values.push(Value::Array(items));
    }
    Ok(values)
  }

  async fn read_slot(
    &self,
    instance: &NodeInstance,
    slot: usize,
    scope: &Arc<ExecutionContext>,
  ) -> Result<Value, GraphError> {
    let port = instance
      .schema
      .slot_port(PortSide::Input, slot, instance.input_tail)
      .ok_or_else(|| GraphError::InvalidSlot {
        node_id: instance.id,
        side: PortSide::Input.to_string(),
        slot,
      })?;

    let source = self
      .topology()
      .incoming_value(instance.id, slot)
      .map(|c| c.source);
    let Some(source) = source else {
      return Ok(port.static_default());
    };
    let Some(upstream) = self.instance(source.node) else {
      return Ok(port.static_default());
    };

    if upstream.is_value_node() && !scope.has_memory(upstream.id) && !scope.in_progress(upstream.id)
    {
      self.process_node(upstream.id, scope.clone()).await?;
    }

    let value = upstream
      .slot(PortSide::Output, source.slot)
      .and_then(|slot_ref| match slot_ref.element {
        None => scope.read_output(upstream.id, slot_ref.port),
        Some(element) => scope.read_output_element(upstream.id, slot_ref.port, element),
      })
      .or_else(|| upstream.output_slot_default(source.slot))
      .unwrap_or_else(|| port.static_default());
    Ok(value)
  }

  /// Run whatever is connected to flow output `slot` of `from` in `scope`.
  pub(crate) async fn continue_flow(
    &self,
    from: NodeId,
    slot: usize,
    scope: Arc<ExecutionContext>,
  ) -> Result<(), GraphError> {
    let instance = self.require(from)?;
    if slot >= instance.schema.flow_outputs.len() {
      return Err(GraphError::InvalidSlot {
        node_id: from,
        side: "flow output".to_string(),
        slot,
      });
    }
    if scope.is_cancelled() {
      return Err(GraphError::Cancelled);
    }

    let destination = self
      .topology()
      .outgoing_flow(from, slot)
      .map(|c| c.destination.node);
    match destination {
      Some(destination) => self.process_node(destination, scope).await,
      None => Ok(()),
    }
  }

  /// Evaluate `node` in an existing context.
  ///
  /// Re-evaluating a node that already has memory in the chain returns
  /// without running its body.
  pub async fn evaluate_in(
    &self,
    node: NodeId,
    scope: &Arc<ExecutionContext>,
  ) -> Result<(), GraphError> {
    self.process_node(node, scope.clone()).await
  }

  /// Resolve input `slot` of `node` in a fresh context.
  pub async fn read_input(&self, node: NodeId, slot: usize) -> Result<Value, GraphError> {
    let scope = self.create_context();
    self.read_input_in(node, slot, &scope).await
  }

  /// Resolve input `slot` of `node` in `scope`.
  pub async fn read_input_in(
    &self,
    node: NodeId,
    slot: usize,
    scope: &Arc<ExecutionContext>,
  ) -> Result<Value, GraphError> {
    let instance = self.require(node)?;
    self.read_slot(&instance, slot, scope).await
  }

  /// Read output `slot` of `node` as held in `scope`'s chain.
  pub fn read_output_in(
    &self,
    node: NodeId,
    slot: usize,
    scope: &ExecutionContext,
  ) -> Option<Value> {
    let instance = self.instance(node)?;
    let slot_ref = instance.slot(PortSide::Output, slot)?;
    match slot_ref.element {
      None => scope.read_output(node, slot_ref.port),
      Some(element) => scope.read_output_element(node, slot_ref.port, element),
    }
  }

  /// Read a node's global store entry.
  pub fn stored(&self, node: NodeId, handle: &str) -> Option<Value> {
    self.shared.store.get(node, handle)
  }

  /// Wait until every spawned dispatch, pass and event handler has finished.
  ///
  /// Concurrent callers take turns, so none of them is left waiting on a
  /// tracker another caller has already reopened.
  pub async fn wait_idle(&self) {
    let _turn = self.shared.idle.lock().await;
    self.shared.tracker.close();
    self.shared.tracker.wait().await;
    self.shared.tracker.reopen();
  }
}

pub(crate) fn node_failure(instance: &NodeInstance, e: NodeError) -> GraphError {
  match e {
    NodeError::Cancelled => GraphError::Cancelled,
    NodeError::Continuation(inner) => *inner,
    source => GraphError::NodeFailed {
      node_id: instance.id,
      type_name: instance.type_name().to_string(),
      source,
    },
  }
}
