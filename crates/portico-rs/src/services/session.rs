//! Sticky-session bindings for load-balanced routes.
//!
//! A binding maps an opaque session id to the URL of the target that served
//! the client first. Ids carry 128 bits of cryptographically secure
//! randomness, hex-encoded to 32 characters. Bindings expire after their TTL;
//! eviction happens on lookup-after-expiry and through a periodic sweep. A
//! binding whose target is unhealthy at lookup time is ignored for that
//! request but kept until expiry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use log::debug;
use rand::RngCore;
use tokio::task::JoinHandle;

/// Interval of the background expiry sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub target_url: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// Process-local session binding store for one load balancer.
#[derive(Debug)]
pub struct SessionStore {
    bindings: RwLock<HashMap<String, SessionBinding>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            bindings: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Generates a fresh session id: 16 random bytes, hex-encoded.
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Looks up the bound target URL for a session id.
    ///
    /// Expired bindings are evicted here; unknown ids return `None` without
    /// distinguishing themselves from expired ones.
    pub fn lookup(&self, session_id: &str) -> Option<String> {
        {
            let bindings = self.bindings.read().unwrap();
            match bindings.get(session_id) {
                Some(binding) if binding.expires_at > Instant::now() => {
                    return Some(binding.target_url.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: upgrade to a write lock and evict.
        let mut bindings = self.bindings.write().unwrap();
        if let Some(binding) = bindings.get(session_id) {
            if binding.expires_at <= Instant::now() {
                bindings.remove(session_id);
            }
        }
        None
    }

    /// Creates or refreshes a binding for the given session id.
    pub fn bind(&self, session_id: &str, target_url: &str) {
        let now = Instant::now();
        let mut bindings = self.bindings.write().unwrap();
        let binding = bindings
            .entry(session_id.to_string())
            .or_insert_with(|| SessionBinding {
                target_url: target_url.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            });
        binding.target_url = target_url.to_string();
        binding.expires_at = now + self.ttl;
    }

    /// Removes expired bindings. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut bindings = self.bindings.write().unwrap();
        let before = bindings.len();
        bindings.retain(|_, binding| binding.expires_at > now);
        before - bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to the periodic sweep task; aborts the task when dropped.
#[derive(Debug)]
pub struct SweepHandle {
    handle: JoinHandle<()>,
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns the expiry sweep for a store.
///
/// The task holds only a weak reference; it ends on its own once the store is
/// dropped, and the returned handle aborts it eagerly on shutdown.
pub fn spawn_sweeper(store: &Arc<SessionStore>) -> SweepHandle {
    let weak: Weak<SessionStore> = Arc::downgrade(store);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(store) = weak.upgrade() else {
                break;
            };
            let evicted = store.sweep();
            if evicted > 0 {
                debug!("Session sweep evicted {} expired bindings", evicted);
            }
        }
    });
    SweepHandle { handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_32_hex_chars() {
        let id = SessionStore::generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, SessionStore::generate_id());
    }

    #[test]
    fn bind_and_lookup() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = SessionStore::generate_id();
        store.bind(&id, "http://a:8080");
        assert_eq!(store.lookup(&id).as_deref(), Some("http://a:8080"));
        assert_eq!(store.lookup("unknown"), None);
    }

    #[test]
    fn rebind_moves_the_target() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.bind("sid", "http://a:8080");
        store.bind("sid", "http://b:8080");
        assert_eq!(store.lookup("sid").as_deref(), Some("http://b:8080"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_binding_is_evicted_on_lookup() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.bind("sid", "http://a:8080");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.lookup("sid"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired_bindings() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.bind("old", "http://a:8080");
        std::thread::sleep(Duration::from_millis(20));
        store.bind("fresh", "http://b:8080");

        // bind() uses the store TTL at call time, so "fresh" is still alive.
        let evicted = store.sweep();
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
    }
}
