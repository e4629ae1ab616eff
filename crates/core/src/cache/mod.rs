//! Named cache stores keyed by request.
//!
//! A store is identified by a name that encodes the asset-set version.
//! Two backends implement [`CacheStore`]:
//!
//! - [`CacheDb`]: persistent SQLite storage via tokio-rusqlite, with
//!   automatic schema migrations and WAL mode
//! - [`MemoryStore`]: process-local storage for tests and ephemeral runs
//!
//! Mutation happens at the granularity of one request key or one whole
//! store. Concurrent writers to the same key resolve as last-write-wins.

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;

pub use crate::Error;
use crate::http::{Request, Response};

pub use connection::CacheDb;
pub use memory::MemoryStore;

/// Storage of named request→response maps.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the named store if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Whether a store with this name exists.
    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// Names of all stores, oldest first.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Drop a store and every entry in it. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Look a request up in one store.
    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>, Error>;

    /// Insert or overwrite one entry, creating the store if needed.
    ///
    /// Only GET requests can be stored.
    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error>;

    /// Store a batch atomically: either every entry lands or none does.
    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error>;

    /// Requests currently stored under a name, in insertion order.
    async fn entries(&self, name: &str) -> Result<Vec<Request>, Error>;
}

pub(crate) fn ensure_storable(request: &Request) -> Result<(), Error> {
    if !request.is_get() {
        return Err(Error::InvalidInput(format!("cannot store {} request for {}", request.method, request.url)));
    }
    Ok(())
}
