//! Per-run host → result cache for email discovery.
//!
//! Owned by the coordinator and passed by `&mut`; workers never see it.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DomainCache {
    entries: HashMap<String, String>,
    writes: usize,
}

impl DomainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str) -> Option<&str> {
        self.entries.get(host).map(String::as_str)
    }

    /// First write wins. Returns `false` if the host was already cached.
    pub fn insert(&mut self, host: &str, result: &str) -> bool {
        if self.entries.contains_key(host) {
            return false;
        }
        self.entries.insert(host.to_string(), result.to_string());
        self.writes += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Successful inserts over the cache's lifetime.
    pub fn writes(&self) -> usize {
        self.writes
    }
}
