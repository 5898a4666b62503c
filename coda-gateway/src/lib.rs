//! HTTP surface of a coda node.
//!
//! One axum router carries the whole node-facing API: the content read
//! path (`/ipfs/:cid` with byte-range support and replica/network
//! fallback), the replication routes (`/export`, `/sync`,
//! `/sync_status`), the upload routes, and the health check the selector
//! relies on.

pub mod config;
pub mod core;
pub mod denylist;
pub mod fetcher;
pub mod handlers;
pub mod headers;
pub mod metrics;
pub mod response;

pub use crate::config::Config;
pub use crate::core::{Core, State};
pub use crate::response::{GatewayError, GatewayResponse};
