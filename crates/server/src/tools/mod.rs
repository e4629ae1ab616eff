//! MCP tool implementations.
//!
//! This module contains all tools exposed by the vrcache server.

pub mod asset_fetch;
pub mod cache;
pub mod worker_status;

pub use asset_fetch::AssetFetchParams;
