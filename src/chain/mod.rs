//! Chain module - RPC access and contract call encoding
//!
//! This module provides:
//! - The `ChainClient` seam consumed by the submission cycle
//! - Multi-RPC provider management with automatic failover
//! - Encoding of the `vote()` call

pub mod contract;
pub mod provider;

pub use contract::VoteCall;
pub use provider::{ChainClient, ChainProvider};

#[cfg(test)]
pub use provider::MockChainClient;
