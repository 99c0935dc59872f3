//! Port allocation for managed servers.
//!
//! The allocator only tracks claims; it never probes the OS. It has no
//! locking of its own and is mutated exclusively by the fleet manager while
//! it holds the fleet lock.

use crate::config::PortRange;
use std::collections::BTreeMap;

/// Table of claimed ports within a fixed inclusive range.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: PortRange,
    claims: BTreeMap<u16, String>,
}

impl PortAllocator {
    /// Create an allocator with no claims.
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            claims: BTreeMap::new(),
        }
    }

    /// The configured range.
    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Lowest unclaimed port in the range, or `None` when exhausted.
    ///
    /// Does not record a claim; pair it with [`claim`](Self::claim).
    pub fn allocate(&self) -> Option<u16> {
        (self.range.min..=self.range.max).find(|port| !self.claims.contains_key(port))
    }

    /// Record `owner` as the holder of `port`.
    ///
    /// Returns `false` without changing anything if the port is outside the
    /// range or held by a different owner. Re-claiming an own port succeeds.
    pub fn claim(&mut self, port: u16, owner: &str) -> bool {
        if !self.contains(port) {
            return false;
        }
        match self.claims.get(&port) {
            Some(current) if current != owner => false,
            _ => {
                self.claims.insert(port, owner.to_string());
                true
            }
        }
    }

    /// Remove the claim on `port`. Releasing an unclaimed port is a no-op.
    pub fn release(&mut self, port: u16) {
        self.claims.remove(&port);
    }

    /// Current holder of `port`.
    pub fn owner(&self, port: u16) -> Option<&str> {
        self.claims.get(&port).map(String::as_str)
    }

    /// Whether `port` lies inside the configured range.
    pub fn contains(&self, port: u16) -> bool {
        (self.range.min..=self.range.max).contains(&port)
    }

    /// Number of claimed ports.
    pub fn claimed(&self) -> usize {
        self.claims.len()
    }
}
