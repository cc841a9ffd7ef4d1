//! # Vellum Test Suite
//!
//! Unified test crate for cross-subsystem scenarios.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs          # shared fixtures
//!     ├── ledger_flow.rs      # submit / execute / query end to end
//!     ├── chain_integrity.rs  # linkage and batching properties
//!     ├── fault_tolerance.rs  # dead orderers, divergent replicas
//!     ├── membership.rs       # conf-change paths over raft and bft
//!     └── restart.rs          # crash, wipe and resume scenarios
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p vellum-tests
//! cargo test -p vellum-tests integration::ledger_flow
//! ```

#![allow(dead_code)]

pub mod integration;
