//! Wisp Schema
//!
//! The type layer of the wisp node graph: the value model every port carries,
//! the registration contract a node type uses to declare its ports, and the
//! immutable [`NodeSchema`] the engine derives from it.
//!
//! Schemas are built once per node type and cached in a [`SchemaCache`].
//! Building fails, permanently for that declaration, when:
//! - a flow node does not take the cancellation parameter first
//! - an input follows an output
//! - a side has more than one variable-size port, or it is not last
//! - a port name repeats on one side

mod declaration;
mod error;
mod port;
mod registry;
mod schema;
mod value;

pub use declaration::{Capabilities, EventKind, NodeDeclaration, Parameter};
pub use error::SchemaError;
pub use port::{NodePort, PortSide};
pub use registry::SchemaCache;
pub use schema::{NodeFlags, NodeSchema, SlotRef};
pub use value::{DataType, Value};
