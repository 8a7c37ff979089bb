//! The graph container, concurrency model, and pull-based render executor.
//!
//! [`context::Context`] is the crate's entry point: it owns the
//! [`graph::AudioGraph`] behind a single lock, a deferred connection queue
//! (see [`pending`]), an update thread that drains it, and a dispatcher
//! (see [`dispatcher`]) for delivering scheduled-source callbacks off the
//! render thread. [`backend::DeviceBackend`] is the seam a device I/O crate
//! implements to drive [`context::Context::render_quantum`].

pub mod backend;
pub mod context;
pub mod dispatcher;
pub mod graph;
pub mod node_id;
pub mod pending;

pub use audiograph_core::GraphConfig;
pub use backend::{DeviceBackend, DeviceInfo};
pub use context::Context;
pub use graph::{AudioGraph, Edge, NodeEntry, NodeInput, NodeOutput};
pub use node_id::NodeId;
