//! User-facing rate limit proxies.
//!
//! A proxy binds a client's coordinator, an endpoint-class group and a
//! resolved scope instance. It hands out the shared handler governing that
//! bucket, exposes read-only introspection over it, and can optionally pin the
//! handler so it outlives the requests flowing through it.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::RateLimitError;
use crate::rate_limit::coordinator::RateLimitCoordinator;
use crate::rate_limit::group::{
    GLOBALLY_LIMITED, LimiterScope, NO_SPECIFIC_LIMITER, RateLimitGroup, UNLIMITED_SIZE,
    effective_size,
};
use crate::rate_limit::handler::RateLimitHandler;
use crate::types::LimitScope;

/// A handle to the rate limit state of one endpoint class within one scope.
///
/// Construction resolves the scope instance identifier eagerly, so scope
/// mismatches surface as errors before any request is made. The proxy itself
/// has no lifecycle: introspection reads through to the shared handler when
/// one exists and falls back to neutral defaults when it does not.
pub struct RateLimitProxy {
    coordinator: Arc<RateLimitCoordinator>,
    group: Arc<RateLimitGroup>,
    key: Arc<RateLimitHandler>,
    cache: Mutex<Weak<RateLimitHandler>>,
}

impl RateLimitProxy {
    /// Create a proxy for a group, resolving the scope instance from `scope`.
    ///
    /// With `keep_alive` the resolved handler is registered in the shared
    /// registry and pinned by this proxy, preventing it from being dropped
    /// between requests.
    pub fn new(
        coordinator: Arc<RateLimitCoordinator>,
        group: Arc<RateLimitGroup>,
        scope: LimitScope,
        keep_alive: bool,
    ) -> Result<Self, RateLimitError> {
        let limiter_id = resolve_limiter_id(&group, &scope)?;
        let key = RateLimitHandler::new(group.clone(), limiter_id);

        let mut proxy = Self {
            coordinator,
            group,
            key,
            cache: Mutex::new(Weak::new()),
        };
        if keep_alive {
            proxy.set_keep_alive(true);
        }
        Ok(proxy)
    }

    /// The group this proxy was created for.
    pub fn group(&self) -> &Arc<RateLimitGroup> {
        &self.group
    }

    /// The resolved scope instance identifier.
    pub fn limiter_id(&self) -> u64 {
        self.key.limiter_id()
    }

    /// Whether the group's buckets are scoped per channel.
    pub fn is_limited_by_channel(&self) -> bool {
        self.group.limiter() == LimiterScope::Channel
    }

    /// Whether the group's buckets are scoped per guild.
    pub fn is_limited_by_guild(&self) -> bool {
        self.group.limiter() == LimiterScope::Guild
    }

    /// Whether the group's buckets are scoped per webhook.
    pub fn is_limited_by_webhook(&self) -> bool {
        self.group.limiter() == LimiterScope::Webhook
    }

    /// Whether the group shares a single bucket across all callers.
    pub fn is_limited_globally(&self) -> bool {
        self.group.limiter() == LimiterScope::Global
    }

    /// Whether the group never blocks.
    pub fn is_unlimited(&self) -> bool {
        self.group.limiter() == LimiterScope::Unlimited
    }

    /// Whether a shared handler currently exists for this proxy's bucket.
    pub fn is_alive(&self) -> bool {
        self.handler().is_some()
    }

    /// Whether the bucket has seen any traffic.
    pub fn has_info(&self) -> bool {
        self.handler().is_some_and(|handler| handler.has_info())
    }

    /// The group's raw cached size.
    pub fn size(&self) -> i32 {
        self.group.size()
    }

    /// Whether an authoritative limit has been observed for the group.
    pub fn has_size_set(&self) -> bool {
        self.group.size() > 0
    }

    /// Whether this proxy pins the shared handler.
    pub fn keep_alive(&self) -> bool {
        let cache = self.cache.lock().expect("proxy cache poisoned");
        cache
            .upgrade()
            .is_some_and(|shared| Arc::ptr_eq(&shared, &self.key))
    }

    /// Pin or unpin the shared handler.
    ///
    /// Pinning registers this proxy's handler in the shared registry (adopting
    /// an already-registered one when present) and holds it strongly.
    /// Unpinning detaches the proxy onto a private copy of the handler
    /// identity so the shared instance can be dropped.
    pub fn set_keep_alive(&mut self, value: bool) {
        let mut cache = self.cache.lock().expect("proxy cache poisoned");

        if value {
            if let Some(shared) = cache.upgrade() {
                if !Arc::ptr_eq(&shared, &self.key) {
                    self.key = shared;
                }
                return;
            }

            let shared = self.coordinator.handlers().set(self.key.clone());
            *cache = Arc::downgrade(&shared);
            self.key = shared;
        } else if let Some(shared) = cache.upgrade() {
            if Arc::ptr_eq(&shared, &self.key) {
                self.key = self.key.detached();
            }
        }
    }

    /// The shared handler for this proxy's bucket, if one currently exists.
    pub fn handler(&self) -> Option<Arc<RateLimitHandler>> {
        let mut cache = self.cache.lock().expect("proxy cache poisoned");
        if let Some(handler) = cache.upgrade() {
            return Some(handler);
        }

        let handler = self.coordinator.handlers().get(self.key.key())?;
        *cache = Arc::downgrade(&handler);
        Some(handler)
    }

    /// The shared handler for this proxy's bucket, creating and registering
    /// one when none exists.
    ///
    /// This is the entry point for the request path: the returned handler is
    /// kept alive by the permits flowing through it.
    pub fn handler_or_create(&self) -> Arc<RateLimitHandler> {
        if let Some(handler) = self.handler() {
            return handler;
        }

        let mut cache = self.cache.lock().expect("proxy cache poisoned");
        let shared = self.coordinator.handlers().set(self.key.detached());
        *cache = Arc::downgrade(&shared);
        shared
    }

    /// Slots currently consumed: in-flight requests plus unexpired cooldowns.
    pub fn used_count(&self) -> u32 {
        self.handler()
            .map(|handler| handler.active() + handler.count_drops())
            .unwrap_or(0)
    }

    /// Slots currently free. Zero for unlimited groups.
    pub fn free_count(&self) -> u32 {
        let size = self.group.size();
        if size == UNLIMITED_SIZE {
            return 0;
        }

        effective_size(size).saturating_sub(self.used_count())
    }

    /// Callers currently suspended waiting for a slot.
    pub fn waiting_count(&self) -> usize {
        self.handler()
            .map(|handler| handler.queued())
            .unwrap_or(0)
    }

    /// The earliest pending cooldown expiry, if any.
    pub fn next_reset_at(&self) -> Option<Instant> {
        self.handler().and_then(|handler| handler.next_reset_at())
    }

    /// Time until the earliest pending cooldown expiry, zero when none.
    pub fn next_reset_after(&self) -> Duration {
        self.handler()
            .map(|handler| handler.next_reset_after())
            .unwrap_or(Duration::ZERO)
    }

    /// Suspend until the currently tracked shared handler is dropped.
    ///
    /// Returns immediately when no shared handler exists. Fails with
    /// [`RateLimitError::KeepAliveActive`] while `keep_alive` is enabled,
    /// since a pinned handler is never replaced by identity.
    pub async fn wait_till_limits_expire(&self) -> Result<(), RateLimitError> {
        let mut watcher = {
            let handler = self.handler();
            let Some(handler) = handler else {
                return Ok(());
            };

            if Arc::ptr_eq(&handler, &self.key) {
                return Err(RateLimitError::KeepAliveActive);
            }

            handler.subscribe()
        };

        // The sender side lives inside the handler; the channel closing means
        // the last strong reference is gone.
        while watcher.changed().await.is_ok() {}
        Ok(())
    }
}

impl std::fmt::Debug for RateLimitProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitProxy")
            .field("group_id", &self.group.group_id())
            .field("limiter", &self.group.limiter())
            .field("limiter_id", &self.key.limiter_id())
            .field("keep_alive", &self.keep_alive())
            .finish()
    }
}

/// Resolve the scope instance identifier a group requires from a scope object.
fn resolve_limiter_id(
    group: &Arc<RateLimitGroup>,
    scope: &LimitScope,
) -> Result<u64, RateLimitError> {
    match group.limiter() {
        LimiterScope::Global => Ok(GLOBALLY_LIMITED),
        LimiterScope::Unlimited => Ok(NO_SPECIFIC_LIMITER),
        LimiterScope::Channel => match *scope {
            LimitScope::Channel { channel_id, .. } | LimitScope::Message { channel_id, .. } => {
                Ok(channel_id.get())
            }
            other => Err(RateLimitError::ScopeMismatch {
                limiter: LimiterScope::Channel,
                supplied: other.describe(),
            }),
        },
        LimiterScope::Guild => match *scope {
            LimitScope::Guild { guild_id } => Ok(guild_id.get()),
            LimitScope::Channel { .. }
            | LimitScope::Message { .. }
            | LimitScope::Role { .. }
            | LimitScope::Webhook { .. } => scope
                .guild_id()
                .map(|guild_id| guild_id.get())
                .ok_or(RateLimitError::MissingGuild {
                    supplied: scope.describe(),
                }),
            LimitScope::None => Err(RateLimitError::ScopeMismatch {
                limiter: LimiterScope::Guild,
                supplied: scope.describe(),
            }),
        },
        LimiterScope::Webhook => match *scope {
            LimitScope::Webhook { webhook_id, .. } => Ok(webhook_id.get()),
            other => Err(RateLimitError::ScopeMismatch {
                limiter: LimiterScope::Webhook,
                supplied: other.describe(),
            }),
        },
    }
}
