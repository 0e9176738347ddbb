//! Rate limit group descriptors.
//!
//! A group describes one endpoint class: what the limit is scoped by and the
//! last-known allowed concurrency. Groups are created once per endpoint class
//! at coordinator construction and shared by every handler of that class.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

/// Sentinel `size` meaning the group never blocks.
pub(crate) const UNLIMITED_SIZE: i32 = -10000;

/// Lowest (most negative) optimistic concurrency estimate a group may reach.
pub(crate) const MAX_OPTIMISTIC_PARALLELISM: i32 = -50;

/// Scope instance identifier for globally limited groups.
pub(crate) const GLOBALLY_LIMITED: u64 = 0x4000_0000_0000_0000;

/// Scope instance identifier for groups without a specific limiter.
pub(crate) const NO_SPECIFIC_LIMITER: u64 = 0;

/// What a rate limit group's buckets are scoped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterScope {
    /// One bucket per channel.
    Channel,
    /// One bucket per guild.
    Guild,
    /// One bucket per webhook.
    Webhook,
    /// A single bucket shared by all callers.
    Global,
    /// No limiting at all; entering never blocks.
    Unlimited,
}

impl fmt::Display for LimiterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimiterScope::Channel => "channel",
            LimiterScope::Guild => "guild",
            LimiterScope::Webhook => "webhook",
            LimiterScope::Global => "global",
            LimiterScope::Unlimited => "unlimited",
        };
        f.write_str(name)
    }
}

/// Allocates group identifiers in fixed strides.
///
/// Identifiers are spaced apart so endpoint classes added between existing
/// ones in later revisions can reuse the gaps without renumbering.
#[derive(Debug)]
pub struct GroupIdAllocator {
    next: AtomicU64,
}

impl GroupIdAllocator {
    const FIRST_ID: u64 = 105 << 8;
    const STRIDE: u64 = 7 << 8;

    /// Create an allocator starting at the first group identifier.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(Self::FIRST_ID),
        }
    }

    fn allocate(&self) -> u64 {
        self.next.fetch_add(Self::STRIDE, Ordering::Relaxed)
    }
}

impl Default for GroupIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Static metadata for one endpoint class.
///
/// Identity (`group_id`) and `limiter` are immutable; `size` is the only
/// mutable field, corrected in place as responses reveal the real limits.
///
/// `size` encoding: positive values are a known concurrency ceiling, `0` is
/// unknown (treated as `1`), negative values are an optimistic estimate whose
/// magnitude is the ceiling guess, and [`UNLIMITED_SIZE`] never blocks.
#[derive(Debug)]
pub struct RateLimitGroup {
    group_id: u64,
    limiter: LimiterScope,
    size: AtomicI32,
}

impl RateLimitGroup {
    /// Create a new group with a freshly allocated identifier.
    ///
    /// Optimistic groups start at `-1`, assuming the endpoint tolerates one
    /// concurrent call until proven otherwise; non-optimistic groups start at
    /// `0` (unknown).
    pub fn new(allocator: &GroupIdAllocator, limiter: LimiterScope, optimistic: bool) -> Arc<Self> {
        Arc::new(Self {
            group_id: allocator.allocate(),
            limiter,
            size: AtomicI32::new(if optimistic { -1 } else { 0 }),
        })
    }

    /// Create the unlimited group.
    ///
    /// One per coordinator, `group_id` 0; shared by every endpoint class that
    /// has no limit at all.
    pub fn unlimited() -> Arc<Self> {
        Arc::new(Self {
            group_id: 0,
            limiter: LimiterScope::Unlimited,
            size: AtomicI32::new(UNLIMITED_SIZE),
        })
    }

    /// The group's unique identifier.
    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    /// What this group's buckets are scoped by.
    pub fn limiter(&self) -> LimiterScope {
        self.limiter
    }

    /// The last-known size value, raw encoding.
    pub fn size(&self) -> i32 {
        self.size.load(Ordering::Acquire)
    }

    /// Replace the cached size.
    ///
    /// Normally maintained from response headers; exposed for seeding known
    /// limits ahead of the first response.
    pub fn set_size(&self, size: i32) {
        self.size.store(size, Ordering::Release);
    }

    /// Whether entering this group never blocks.
    pub fn is_unlimited(&self) -> bool {
        self.size() == UNLIMITED_SIZE
    }

    /// The admission capacity implied by the raw size.
    ///
    /// `0` counts as `1`, optimistic estimates count by magnitude. Callers
    /// must check [`is_unlimited`](Self::is_unlimited) first.
    pub(crate) fn effective_size(&self) -> u32 {
        effective_size(self.size())
    }
}

/// Decode a raw size value into an admission capacity.
pub(crate) fn effective_size(size: i32) -> u32 {
    if size == 0 { 1 } else { size.unsigned_abs() }
}

impl PartialEq for RateLimitGroup {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id
    }
}

impl Eq for RateLimitGroup {}

impl std::hash::Hash for RateLimitGroup {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.group_id.hash(state);
    }
}
