//! Fixed-rate update loop.
//!
//! Each tick first runs passive updates, which only touch auxiliary state,
//! then offers every active-update node a recompute. An active node that
//! reports a change propagates: a flow trigger starts a pass on itself, a
//! pure value source dispatches its trigger tree.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::dispatch::node_failure;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::NodeInstance;
use crate::node_context::NodeContext;

impl Graph {
  pub(crate) fn spawn_update_loop(
    &self,
    interval: Duration,
    cancel: CancellationToken,
  ) -> JoinHandle<()> {
    let graph = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      debug!(interval_ms = interval.as_millis() as u64, "update_loop_started");

      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => graph.tick(&cancel).await,
        }
      }
      debug!("update_loop_stopped");
    })
  }

  /// Run one update tick.
  pub async fn tick(&self, cancel: &CancellationToken) {
    let (passive, active): (Vec<NodeInstance>, Vec<NodeInstance>) = {
      let topology = self.topology();
      let passive = topology
        .nodes
        .values()
        .filter(|n| n.schema.capabilities.passive_update)
        .cloned()
        .collect();
      let active = topology
        .nodes
        .values()
        .filter(|n| n.schema.capabilities.active_update)
        .cloned()
        .collect();
      (passive, active)
    };

    for instance in passive {
      let scope = ExecutionContext::root(cancel.child_token());
      let ctx = NodeContext::new(self.clone(), instance.clone(), scope, Vec::new());
      instance.behavior.on_passive_update(&ctx);
    }

    join_all(
      active
        .into_iter()
        .map(|instance| self.offer_update(instance, cancel)),
    )
    .await;
  }

  async fn offer_update(&self, instance: NodeInstance, cancel: &CancellationToken) {
    let scope = ExecutionContext::root(cancel.child_token());
    let result = tokio::select! {
      biased;
      _ = cancel.cancelled() => return,
      result = self.run_update(&instance, &scope) => result,
    };

    match result {
      Ok(true) => {
        let flags = instance.schema.flags;
        if instance.is_flow_trigger() {
          self.start_flow(instance.id, None);
        } else if flags.is_value_output && !flags.is_flow_output {
          self.dispatch(instance.id);
        }
      }
      Ok(false) => {}
      Err(GraphError::Cancelled) => {}
      Err(e) => warn!(node_id = %instance.id, error = %e, "update_failed"),
    }
  }

  async fn run_update(
    &self,
    instance: &NodeInstance,
    scope: &std::sync::Arc<ExecutionContext>,
  ) -> Result<bool, GraphError> {
    let inputs = self.backtrack(instance, scope).await?;
    let mut ctx = NodeContext::new(self.clone(), instance.clone(), scope.clone(), inputs);
    instance
      .behavior
      .on_update(&mut ctx)
      .await
      .map_err(|e| node_failure(instance, e))
  }
}
