//! # depot-common
//!
//! Common types, errors, and constants for DepotDB.
//!
//! This crate provides the foundational pieces shared by every DepotDB
//! component:
//!
//! - **Types**: transaction identifiers (`TxnId`) and commit versions (`Version`)
//! - **Errors**: the unified [`DepotError`] with stable [`ErrorCode`]s
//! - **Constants**: format magics and default limits
//!
//! ## Example
//!
//! ```rust
//! use depot_common::error::{DepotError, DepotResult};
//! use depot_common::types::Version;
//!
//! fn lookup(name: &str) -> DepotResult<Version> {
//!     Err(DepotError::UnknownTable { table: name.to_string() })
//! }
//!
//! assert!(lookup("rev").is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod error;
pub mod types;

pub use error::{DepotError, DepotResult, ErrorCode};
pub use types::{TxnId, Version};
