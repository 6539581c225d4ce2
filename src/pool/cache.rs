//! Bounded per-credential transport cache.
//!
//! # Responsibilities
//! - Hand out a shared transport per credential
//! - Rebuild entries older than the configured lifetime
//! - Evict the least recently used credential when full
//!
//! # Design Decisions
//! - One mutex around the whole map, never held across `.await`
//! - Transports are built under the lock so two callers never race to build
//!   the same credential's pool
//! - Eviction only drops the cache's reference: a caller mid-retry keeps its
//!   lease and the pool closes when the last lease goes away
//! - `clear` additionally closes every transport, for shutdown

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::observability::metrics;
use crate::pool::lru::LruMap;
use crate::pool::transport::{Transport, TransportError, TransportFactory};
use crate::security::credential::Credential;

/// Caller's lease on a pooled transport.
pub type TransportHandle = Arc<dyn Transport>;

struct CachedTransport {
    transport: TransportHandle,
    created_at: Instant,
}

/// Credential → transport registry with LRU eviction.
pub struct ClientCache {
    entries: Mutex<LruMap<Credential, CachedTransport>>,
    factory: Arc<dyn TransportFactory>,
    max_lifetime: Option<Duration>,
}

impl ClientCache {
    pub fn new(
        capacity: NonZeroUsize,
        max_lifetime: Option<Duration>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            entries: Mutex::new(LruMap::new(capacity)),
            factory,
            max_lifetime,
        }
    }

    /// Return the cached transport for `credential`, building one on a miss.
    pub fn acquire(&self, credential: &Credential) -> Result<TransportHandle, TransportError> {
        let mut entries = self.lock();

        if let Some(entry) = entries.get(credential) {
            if !self.is_expired(entry) {
                return Ok(Arc::clone(&entry.transport));
            }
            tracing::debug!(credential = %credential, "Cached transport expired, rebuilding");
            entries.pop(credential);
        }

        let transport = self.factory.build(credential)?;
        let entry = CachedTransport {
            transport: Arc::clone(&transport),
            created_at: Instant::now(),
        };
        if let Some((evicted, _)) = entries.put(credential.clone(), entry) {
            tracing::debug!(credential = %evicted, "Evicted least recently used transport");
            metrics::record_cache_eviction();
        }
        metrics::record_cache_size(entries.len());

        Ok(transport)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap()
    }

    pub fn contains(&self, credential: &Credential) -> bool {
        self.lock().contains(credential)
    }

    /// Drop and close every cached transport.
    pub fn clear(&self) {
        let drained = self.lock().drain();
        for (_, entry) in &drained {
            entry.transport.close();
        }
        metrics::record_cache_size(0);
        tracing::debug!(closed = drained.len(), "Cleared transport cache");
    }

    fn is_expired(&self, entry: &CachedTransport) -> bool {
        self.max_lifetime
            .is_some_and(|lifetime| entry.created_at.elapsed() >= lifetime)
    }

    fn lock(&self) -> MutexGuard<'_, LruMap<Credential, CachedTransport>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
