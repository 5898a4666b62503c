//! Replica set selection.
//!
//! Given the registry's content node list and the expected service
//! version, pick one primary and N−1 secondaries: filter by allow/deny
//! lists, optionally by sync eligibility, health-check the survivors in
//! bounded parallel, then rank by version and measured latency. Every
//! stage is recorded in an ordered decision trace so a failed selection
//! can explain itself.

pub mod config;
pub mod health;
mod selector;

pub use crate::config::Config;
pub use crate::health::{HealthSample, SyncCheck};
pub use crate::selector::{
    DecisionTrace, SelectError, SelectOpts, Selection, Selector, Stage, TraceStage,
};
