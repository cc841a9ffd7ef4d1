//! # Node Runtime
//!
//! Configuration, telemetry and wiring for the `vellum-node` binary.

pub mod config;
pub mod telemetry;
pub mod wiring;

pub use config::{Backend, NodeConfig, Role};
pub use wiring::{build, run, Node};
