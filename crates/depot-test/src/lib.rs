//! # depot-test
//!
//! Integration tests for DepotDB.
//!
//! This crate contains:
//! - Fixtures for in-memory and on-disk engines
//! - Randomized workload generators checked against a reference model
//!
//! The tests themselves live under `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;

/// Workload generators
pub mod workload;
