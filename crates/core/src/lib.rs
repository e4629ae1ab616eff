//! Core types and shared functionality for vrcache.
//!
//! This crate provides:
//! - Named cache stores (SQLite and in-memory backends)
//! - The request/response model stored in them
//! - Unified error types
//! - Configuration and the asset manifest

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;

pub use cache::{CacheDb, CacheStore, MemoryStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Request, Response, ResponseType};
pub use manifest::Manifest;
