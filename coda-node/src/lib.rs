//! Composition of a coda content node.
//!
//! Wires the record store, the replication engine and the gateway into
//! one process, the way the node binary runs them in production. The
//! pieces stay individually constructible so tests can run several nodes
//! in-process.

pub mod config;
pub mod node;

pub use crate::config::NodeConfig;
pub use crate::node::Node;
