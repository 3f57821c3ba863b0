//! Error handling for DepotDB.
//!
//! This module provides the unified error type and result alias used
//! across all DepotDB components.

mod depot;

pub use depot::{DepotError, ErrorCode};

/// Result type alias for DepotDB operations.
pub type DepotResult<T> = std::result::Result<T, DepotError>;
