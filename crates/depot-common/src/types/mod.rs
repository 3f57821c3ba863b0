//! Type definitions shared across DepotDB crates.

mod ids;

pub use ids::{TxnId, Version};
