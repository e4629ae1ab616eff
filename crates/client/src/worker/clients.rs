//! Pages (clients) open under the worker scope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Identifier of one open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Tracks which open clients are controlled by the active worker.
///
/// A client's controller is fixed at open/reload time, except for `claim`,
/// which adopts every open client at once.
#[derive(Debug, Default)]
pub struct Clients {
    next_id: AtomicU64,
    controlled: Mutex<BTreeMap<ClientId, bool>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. `controlled` is whether a worker is active right now.
    pub fn open(&self, controlled: bool) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id, controlled);
        id
    }

    pub fn close(&self, id: ClientId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Reloading re-evaluates control, as a fresh navigation would.
    pub fn reload(&self, id: ClientId, controlled: bool) -> bool {
        match self.lock().get_mut(&id) {
            Some(slot) => {
                *slot = controlled;
                true
            }
            None => false,
        }
    }

    /// Take control of every open client. Returns how many changed hands.
    pub fn claim(&self) -> usize {
        let mut clients = self.lock();
        let mut claimed = 0;
        for controlled in clients.values_mut().filter(|c| !**c) {
            *controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// None when the client is unknown.
    pub fn is_controlled(&self, id: ClientId) -> Option<bool> {
        self.lock().get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ClientId, bool>> {
        // A poisoned map still holds valid booleans.
        self.controlled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_assigns_distinct_ids() {
        let clients = Clients::new();
        let a = clients.open(false);
        let b = clients.open(true);
        assert_ne!(a, b);
        assert_eq!(clients.len(), 2);
        assert_eq!(clients.is_controlled(a), Some(false));
        assert_eq!(clients.is_controlled(b), Some(true));
    }

    #[test]
    fn test_claim_adopts_uncontrolled() {
        let clients = Clients::new();
        let a = clients.open(false);
        let b = clients.open(true);
        let c = clients.open(false);

        assert_eq!(clients.claim(), 2);
        for id in [a, b, c] {
            assert_eq!(clients.is_controlled(id), Some(true));
        }
        assert_eq!(clients.claim(), 0);
    }

    #[test]
    fn test_reload_and_close() {
        let clients = Clients::new();
        let a = clients.open(false);
        assert!(clients.reload(a, true));
        assert_eq!(clients.is_controlled(a), Some(true));

        assert!(clients.close(a));
        assert!(!clients.close(a));
        assert!(!clients.reload(a, true));
        assert_eq!(clients.is_controlled(a), None);
        assert!(clients.is_empty());
    }
}
