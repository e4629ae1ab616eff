//! In-memory cache store.
//!
//! Keeps everything in process memory behind a tokio RwLock. Store and
//! entry order follow insertion, matching the SQLite backend.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CacheStore, ensure_storable};
use crate::Error;
use crate::http::{Request, Response};

#[derive(Debug, Default)]
struct NamedCache {
    name: String,
    entries: Vec<(String, Request, Response)>,
}

impl NamedCache {
    fn upsert(&mut self, request: Request, response: Response) {
        let key = request.cache_key();
        match self.entries.iter_mut().find(|(k, _, _)| *k == key) {
            Some(slot) => slot.2 = response,
            None => self.entries.push((key, request, response)),
        }
    }
}

/// Process-local [`CacheStore`]. Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    caches: Arc<RwLock<Vec<NamedCache>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_or_create<'a>(caches: &'a mut Vec<NamedCache>, name: &str) -> &'a mut NamedCache {
    match caches.iter().position(|c| c.name == name) {
        Some(idx) => &mut caches[idx],
        None => {
            caches.push(NamedCache { name: name.to_string(), entries: Vec::new() });
            let last = caches.len() - 1;
            &mut caches[last]
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let mut caches = self.caches.write().await;
        find_or_create(&mut caches, name);
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.caches.read().await.iter().map(|c| c.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        let key = request.cache_key();
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.entries.iter().find(|(k, _, _)| *k == key))
            .map(|(_, _, response)| response.clone()))
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error> {
        ensure_storable(request)?;
        let mut caches = self.caches.write().await;
        find_or_create(&mut caches, name).upsert(request.clone(), response);
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        for (request, _) in &entries {
            ensure_storable(request)?;
        }
        let mut caches = self.caches.write().await;
        let cache = find_or_create(&mut caches, name);
        for (request, response) in entries {
            cache.upsert(request, response);
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<Request>, Error> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.entries.iter().map(|(_, request, _)| request.clone()).collect())
            .unwrap_or_default())
    }
}
