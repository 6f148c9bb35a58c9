//! Start, stop and event broadcast.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::context::ExecutionContext;
use crate::dispatch::node_failure;
use crate::error::GraphError;
use crate::events::GraphEvent;
use crate::graph::{Graph, lock};
use crate::node::NodeInstance;
use crate::node_context::NodeContext;

impl Graph {
  /// Start running: launch the update loop and broadcast [`GraphEvent::Start`].
  #[instrument(name = "graph_start", skip(self))]
  pub async fn start(&self) {
    {
      let mut run = lock(&self.shared.run);
      if run.running {
        return;
      }
      if run.cancel.is_cancelled() {
        run.cancel = CancellationToken::new();
      }
      run.running = true;
      if let Some(interval) = self.shared.config.update_interval() {
        run.update_loop = Some(self.spawn_update_loop(interval, run.cancel.clone()));
      }
    }

    info!(
      nodes = self.node_count(),
      update_rate_hz = self.shared.config.update_rate_hz,
      "graph_started"
    );
    self.broadcast(GraphEvent::Start);
  }

  /// Stop running.
  ///
  /// Cancels the update loop and every pass, waits for all of them, offers
  /// [`GraphEvent::Stop`] to stop handlers, then clears the global store and
  /// resets non-persistent variables. Stop handlers cannot start new passes.
  #[instrument(name = "graph_stop", skip(self))]
  pub async fn stop(&self) {
    let update_loop = {
      let mut run = lock(&self.shared.run);
      if !run.running {
        return;
      }
      run.running = false;
      run.cancel.cancel();
      run.update_loop.take()
    };

    if let Some(handle) = update_loop {
      let _ = handle.await;
    }
    self.wait_idle().await;

    lock(&self.shared.run).cancel = CancellationToken::new();
    self.broadcast(GraphEvent::Stop);
    self.wait_idle().await;

    self.shared.store.clear();
    lock(&self.shared.passes).clear();
    self.reset_variables();
    info!("graph_stopped");
  }

  /// Offer an external event to every node that handles its kind.
  ///
  /// Ignored while the graph is stopped. Handlers run concurrently, each in
  /// its own context.
  pub fn handle_event(&self, event: GraphEvent) {
    if !self.is_running() {
      debug!(event = ?event.kind(), "event_ignored");
      return;
    }
    self.broadcast(event);
  }

  pub(crate) fn broadcast(&self, event: GraphEvent) {
    let kind = event.kind();
    let targets: Vec<NodeInstance> = self
      .topology()
      .nodes
      .values()
      .filter(|n| n.schema.capabilities.handles(kind))
      .cloned()
      .collect();

    debug!(event = ?kind, targets = targets.len(), "event_broadcast");

    let event = Arc::new(event);
    for instance in targets {
      let graph = self.clone();
      let event = event.clone();
      let span = info_span!("event_handler", node_id = %instance.id, event = ?kind);
      self
        .shared
        .tracker
        .spawn(async move { graph.offer_event(instance, &event).await }.instrument(span));
    }
  }

  async fn offer_event(&self, instance: NodeInstance, event: &GraphEvent) {
    let scope = self.create_context();
    let result = tokio::select! {
      biased;
      _ = scope.cancellation().cancelled() => Err(GraphError::Cancelled),
      result = self.run_event_handler(&instance, &scope, event) => result,
    };

    match result {
      Ok(true) if self.is_running() => {
        if let Err(e) = self.dispatch_from(instance.id, Some(scope)).await {
          if !e.is_cancelled() {
            warn!(error = %e, "event_dispatch_failed");
          }
        }
      }
      Ok(_) => {}
      Err(GraphError::Cancelled) => debug!("event_handler_cancelled"),
      Err(e) => warn!(error = %e, "event_handler_failed"),
    }
  }

  async fn run_event_handler(
    &self,
    instance: &NodeInstance,
    scope: &Arc<ExecutionContext>,
    event: &GraphEvent,
  ) -> Result<bool, GraphError> {
    let inputs = self.backtrack(instance, scope).await?;
    let mut ctx = NodeContext::new(self.clone(), instance.clone(), scope.clone(), inputs);
    instance
      .behavior
      .on_event(&mut ctx, event)
      .await
      .map_err(|e| node_failure(instance, e))
  }
}
