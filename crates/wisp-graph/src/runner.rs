//! Channel-fed event loop.
//!
//! The `EventRunner` owns an mpsc channel of external [`GraphEvent`]s and
//! forwards each one to a running [`Graph`].

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::GraphError;
use crate::events::GraphEvent;
use crate::graph::Graph;

/// Forwards external events to a graph.
///
/// # Usage
///
/// ```ignore
/// let runner = EventRunner::new(graph.clone());
///
/// // Hand the sender to event sources (OSC listener, UI, stdin, ...)
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct EventRunner {
  sender: mpsc::Sender<GraphEvent>,
  receiver: mpsc::Receiver<GraphEvent>,
  graph: Graph,
}

impl EventRunner {
  /// Create a runner sized by the graph's configured event buffer.
  pub fn new(graph: Graph) -> Self {
    let buffer_size = graph.config().event_buffer.max(1);
    Self::with_buffer_size(graph, buffer_size)
  }

  pub fn with_buffer_size(graph: Graph, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      graph,
    }
  }

  /// Get a sender handle for delivering events.
  pub fn sender(&self) -> mpsc::Sender<GraphEvent> {
    self.sender.clone()
  }

  /// Deliver an event through the channel.
  pub async fn send(&self, event: GraphEvent) -> Result<(), GraphError> {
    self
      .sender
      .send(event)
      .await
      .map_err(|_| GraphError::Cancelled)
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Run until `cancel` fires or every sender is dropped.
  pub async fn start(self, cancel: CancellationToken) -> Result<(), GraphError> {
    let Self {
      sender,
      mut receiver,
      graph,
    } = self;
    // Only external senders keep the loop alive.
    drop(sender);

    info!(nodes = graph.node_count(), "event_runner_started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("event_runner_cancelled");
          break;
        }
        event = receiver.recv() => match event {
          Some(event) => {
            debug!(event = ?event.kind(), "event_received");
            graph.handle_event(event);
          }
          None => {
            info!("event_runner_channel_closed");
            break;
          }
        }
      }
    }

    Ok(())
  }
}
