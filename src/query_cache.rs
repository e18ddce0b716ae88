//! Bounded LRU of routing results, resident in the worker.
//!
//! Keys are [`QueryFingerprint`]s built from the fields of a [`Query`] that
//! change the answer. The cache only absorbs repeated interaction; a miss is
//! always answerable by asking the engine again.

use crate::engine::Query;
use crate::error::PlannerError;
use log::debug;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Deterministic cache key for a routing query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    /// Destinations are compared as a set: order and duplicates do not matter.
    pub fn of(query: &Query) -> Result<Self, PlannerError> {
        let mut destinations: Vec<&str> = query.destinations.iter().map(String::as_str).collect();
        destinations.sort_unstable();
        destinations.dedup();
        let normalized = serde_json::to_string(&(
            query.origin.as_str(),
            destinations,
            query.departure_time.to_seconds(),
            query.max_transfers,
        ))?;
        Ok(QueryFingerprint(normalized))
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryFingerprint {
    fn from(raw: &str) -> Self {
        QueryFingerprint(raw.to_string())
    }
}

pub struct QueryResultCache<V: ?Sized> {
    entries: LruCache<QueryFingerprint, Rc<V>>,
}

impl<V: ?Sized> QueryResultCache<V> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        QueryResultCache {
            entries: LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presence check that leaves recency untouched.
    pub fn contains(&self, fingerprint: &QueryFingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    /// Look up and mark as most recently used.
    pub fn get(&mut self, fingerprint: &QueryFingerprint) -> Option<Rc<V>> {
        self.entries.get(fingerprint).cloned()
    }

    /// Store `value`, evicting the least recently used entry when full.
    /// Returns the evicted fingerprint, if any. Replacing the value of a
    /// fingerprint already present evicts nothing.
    pub fn insert(
        &mut self,
        fingerprint: QueryFingerprint,
        value: Rc<V>,
    ) -> Option<QueryFingerprint> {
        let (displaced, _) = self.entries.push(fingerprint.clone(), value)?;
        if displaced == fingerprint {
            return None;
        }
        debug!("Query cache full, evicted {}", displaced);
        Some(displaced)
    }

    /// Return the cached result or run `compute` and remember its success.
    /// Failures are passed through and never cached.
    pub fn get_or_compute<E, F>(
        &mut self,
        fingerprint: QueryFingerprint,
        compute: F,
    ) -> Result<Rc<V>, E>
    where
        F: FnOnce() -> Result<Rc<V>, E>,
    {
        if let Some(hit) = self.get(&fingerprint) {
            debug!("Query cache hit for {}", fingerprint);
            return Ok(hit);
        }
        debug!("Query cache miss for {}", fingerprint);
        let value = compute()?;
        self.insert(fingerprint, Rc::clone(&value));
        Ok(value)
    }

    /// Best-effort footprint reduction: drop the least recently used half.
    /// Returns how many entries were dropped.
    pub fn relieve_pressure(&mut self) -> usize {
        let target = self.entries.len() / 2;
        let mut dropped = 0;
        while self.entries.len() > target && self.entries.pop_lru().is_some() {
            dropped += 1;
        }
        dropped
    }
}
