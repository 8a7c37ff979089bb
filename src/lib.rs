pub use audiograph_core as core;

pub use audiograph_core::*;
pub use audiograph_graph::*;
pub use audiograph_nodes as nodes;

#[cfg(feature = "cpal")]
pub use audiograph_cpal as cpal;
