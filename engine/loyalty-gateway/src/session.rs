//! Session cache
//!
//! Maps opaque tokens to logins. Each entry carries a TTL counted in sweeps:
//! a token is evicted once it has gone `ttl_units` sweeps without being
//! resolved. Resolving a token resets its TTL to the full budget.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
struct SessionEntry {
    login: String,
    // atomic so a refresh only needs the shared lock
    ttl: AtomicI64,
}

/// Token to login map with sliding expiration
#[derive(Debug)]
pub struct SessionCache {
    entries: RwLock<HashMap<String, SessionEntry>>,
    ttl_budget: i64,
}

impl SessionCache {
    /// Create an empty cache. Tokens survive `ttl_units` idle sweeps.
    pub fn new(ttl_units: u32) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl_budget: i64::from(ttl_units.max(1)) }
    }

    /// Issue a fresh token for `login`
    pub fn issue(&self, login: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let entry = SessionEntry { login: login.to_string(), ttl: AtomicI64::new(self.ttl_budget) };

        self.entries.write().insert(token.clone(), entry);
        token
    }

    /// Login behind `token`, refreshing its TTL
    pub fn resolve(&self, token: &str) -> Option<String> {
        let entries = self.entries.read();
        let entry = entries.get(token)?;
        entry.ttl.store(self.ttl_budget, Ordering::Relaxed);
        Some(entry.login.clone())
    }

    /// Drop a token. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.entries.write().remove(token).is_some()
    }

    /// Age every entry by one unit and evict the expired ones.
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.ttl.fetch_sub(1, Ordering::Relaxed) > 1);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Sweep `cache` every `every` until `shutdown` flips to true
pub async fn run_sweeper(cache: Arc<SessionCache>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    info!("Session sweeper started (interval={:?})", every);

    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, remaining = cache.len(), "Evicted idle sessions");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Session sweeper stopped");
}
