//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting the named cache stores.

pub mod list;

pub use list::list_impl;
