//! Wisp Graph
//!
//! The execution engine for wisp node graphs. A [`Graph`] owns nodes,
//! connections and groups, and runs them:
//!
//! - **Dispatch**: a value change walks forward to the reactive triggers it
//!   affects, evaluates the value nodes in between once, then starts one
//!   flow pass per trigger.
//! - **Flow passes**: each pass runs in its own [`ExecutionContext`]. At most
//!   one pass is live per node (unless the node is multi-flow); a new pass
//!   cancels and awaits the previous one before it starts.
//! - **Memory**: node outputs are memoized per context. Child contexts read
//!   through to their parents; their own writes vanish with them.
//! - **Coercion**: connecting mismatched value ports inserts a cast or
//!   stringify adapter node when one exists.
//! - **Events and updates**: external [`GraphEvent`]s and a fixed-rate update
//!   loop feed changes into dispatch.
//!
//! Node types implement [`Node`] and describe their ports with a
//! [`wisp_schema::NodeDeclaration`].

mod coercion;
mod connection;
mod context;
mod dispatch;
mod error;
mod events;
mod graph;
mod ids;
mod lifecycle;
mod node;
mod node_context;
mod runner;
mod store;
mod topology;
mod update;
mod variables;

pub use coercion::{CastAdapter, StringifyAdapter, find_bridge};
pub use connection::{ConnectOutcome, Connection, ConnectionKind, Endpoint};
pub use context::{ExecutionContext, NodeMemory};
pub use error::{GraphError, NodeError};
pub use events::GraphEvent;
pub use graph::Graph;
pub use ids::{ConnectionId, GroupId, NodeId};
pub use node::{Node, NodeInstance, Position};
pub use node_context::NodeContext;
pub use runner::EventRunner;
pub use store::GlobalStore;
pub use topology::Group;
pub use variables::Variable;

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
