//! Cooldown ledger: time-bucketed slot reservations.
//!
//! Every response that carries rate limit information reserves slots until the
//! bucket's reset time. The ledger keeps those reservations as an ordered
//! sequence of `(expiry, allocates)` buckets, coalescing expiries that land
//! within a small tolerance window of each other. Bucket count is bounded by
//! the number of distinct response-driven windows observed, not one entry per
//! request.

use std::time::Duration;

use tokio::time::Instant;

/// Expiries within this window of each other are merged into one bucket.
pub(crate) const DROP_MERGE_TOLERANCE: Duration = Duration::from_millis(200);

/// One cooldown bucket: `allocates` slots reserved until `drop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CooldownDrop {
    /// Absolute expiry time.
    pub drop: Instant,
    /// Slots consumed at that expiry.
    pub allocates: u32,
}

/// Ordered, coalesced sequence of cooldown buckets, ascending by expiry.
#[derive(Debug, Default)]
pub(crate) struct CooldownLedger {
    drops: Vec<CooldownDrop>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        Self { drops: Vec::new() }
    }

    /// Insert or merge an expiry record.
    ///
    /// A record within [`DROP_MERGE_TOLERANCE`] of an existing bucket merges
    /// into it, keeping the earlier expiry dominant and summing allocates.
    /// Otherwise a fresh bucket is spliced in at its sorted position.
    pub fn update_with(&mut self, drop: Instant, allocates: u32) {
        for index in 0..self.drops.len() {
            let existing = self.drops[index];
            if drop + DROP_MERGE_TOLERANCE < existing.drop {
                self.drops.insert(index, CooldownDrop { drop, allocates });
                return;
            }

            if drop > existing.drop + DROP_MERGE_TOLERANCE {
                continue;
            }

            let merged = &mut self.drops[index];
            if drop < merged.drop {
                merged.drop = drop;
            }
            merged.allocates += allocates;
            return;
        }

        self.drops.push(CooldownDrop { drop, allocates });
    }

    /// Total slots currently reserved but not yet expired.
    pub fn count(&self) -> u32 {
        self.drops.iter().map(|drop| drop.allocates).sum()
    }

    /// The earliest pending bucket.
    pub fn front(&self) -> Option<CooldownDrop> {
        self.drops.first().copied()
    }

    /// Discard the earliest bucket, returning it.
    pub fn pop_front(&mut self) -> Option<CooldownDrop> {
        if self.drops.is_empty() {
            None
        } else {
            Some(self.drops.remove(0))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.drops.len()
    }
}
