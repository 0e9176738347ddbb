//! Per-bucket admission control.
//!
//! A handler owns the runtime state of one `(group, scope instance)` pair: the
//! in-flight count, the FIFO queue of suspended callers, the cooldown ledger
//! and the single scheduled wakeup that drains it. Callers `enter` before the
//! HTTP request and `exit` with the response headers; the permit returned by
//! `enter` guarantees the exit happens on every path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::headers::RateLimitHeaders;
use crate::rate_limit::group::{
    GLOBALLY_LIMITED, LimiterScope, MAX_OPTIMISTIC_PARALLELISM, NO_SPECIFIC_LIMITER, RateLimitGroup,
    effective_size,
};
use crate::rate_limit::ledger::CooldownLedger;

/// Cooldown assumed after a response that carries no rate limit information.
const OPTIMISTIC_DELAY: Duration = Duration::from_secs(1);

/// Structural identity of a handler: the group plus the resolved scope
/// instance. Two handlers with equal keys govern the same server-side bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    /// The owning group's identifier.
    pub group_id: u64,
    /// The resolved scope instance identifier.
    pub limiter_id: u64,
}

struct ScheduledWakeup {
    when: Instant,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct HandlerState {
    active: u32,
    queue: VecDeque<oneshot::Sender<()>>,
    drops: CooldownLedger,
    wakeupper: Option<ScheduledWakeup>,
    entered: bool,
}

/// Runtime rate limit state for one `(group, scope instance)` pair.
///
/// Long-lived and cycling: idle when nothing is in flight, saturated when
/// `active + reserved` reaches the group's effective size, at which point new
/// entrants queue and are released strictly in FIFO order.
pub struct RateLimitHandler {
    parent: Arc<RateLimitGroup>,
    limiter_id: u64,
    state: Mutex<HandlerState>,
    alive: watch::Sender<()>,
}

impl RateLimitHandler {
    /// Create a handler for a group and resolved scope instance.
    ///
    /// Global and unlimited groups ignore the supplied instance and use their
    /// fixed sentinels.
    pub fn new(parent: Arc<RateLimitGroup>, limiter_id: u64) -> Arc<Self> {
        let limiter_id = match parent.limiter() {
            LimiterScope::Unlimited => NO_SPECIFIC_LIMITER,
            LimiterScope::Global => GLOBALLY_LIMITED,
            _ => limiter_id,
        };

        let (alive, _) = watch::channel(());
        Arc::new(Self {
            parent,
            limiter_id,
            state: Mutex::new(HandlerState::default()),
            alive,
        })
    }

    /// A fresh handler with the same identity and empty runtime state.
    pub fn detached(&self) -> Arc<Self> {
        Self::new(self.parent.clone(), self.limiter_id)
    }

    /// The owning group descriptor.
    pub fn parent(&self) -> &Arc<RateLimitGroup> {
        &self.parent
    }

    /// The resolved scope instance identifier.
    pub fn limiter_id(&self) -> u64 {
        self.limiter_id
    }

    /// Structural identity of this handler.
    pub fn key(&self) -> HandlerKey {
        HandlerKey {
            group_id: self.parent.group_id(),
            limiter_id: self.limiter_id,
        }
    }

    /// A receiver that reports closure when the handler is dropped.
    pub(crate) fn subscribe(&self) -> watch::Receiver<()> {
        self.alive.subscribe()
    }

    /// Acquire an admission slot, suspending while the bucket is saturated.
    ///
    /// Unlimited groups admit immediately. Queued callers are released in
    /// FIFO order; a new entrant never overtakes an existing waiter.
    pub async fn enter(self: &Arc<Self>) -> RateLimitPermit {
        if self.parent.is_unlimited() {
            return RateLimitPermit {
                handler: self.clone(),
                exited: false,
            };
        }

        let waiter = {
            let mut state = self.state.lock().expect("handler state poisoned");
            state.entered = true;

            let free = self.parent.effective_size() as i64
                - state.active as i64
                - state.drops.count() as i64;

            if state.queue.is_empty() && free > 0 {
                state.active += 1;
                None
            } else {
                let (sender, receiver) = oneshot::channel();
                state.queue.push_back(sender);
                Some(receiver)
            }
        };

        if let Some(receiver) = waiter {
            // Closed senders cannot occur while the handler is alive, and the
            // permit below keeps it alive; either way we own a slot now.
            let _ = receiver.await;
            let mut state = self.state.lock().expect("handler state poisoned");
            state.active += 1;
        }

        RateLimitPermit {
            handler: self.clone(),
            exited: false,
        }
    }

    /// Record the outcome of a request and free up capacity.
    ///
    /// `None` means the request failed before reaching the server: cooldown
    /// bookkeeping is skipped and waiters are woken immediately so a dropped
    /// connection cannot starve the queue.
    pub fn exit(self: &Arc<Self>, headers: Option<&RateLimitHeaders>) {
        if self.parent.is_unlimited() {
            return;
        }

        let mut state = self.state.lock().expect("handler state poisoned");
        state.active = state.active.saturating_sub(1);

        let Some(headers) = headers else {
            trace!(
                group_id = self.parent.group_id(),
                limiter_id = self.limiter_id,
                "request failed locally, releasing waiters without cooldown"
            );
            if let Some(wakeup) = state.wakeupper.take() {
                wakeup.task.abort();
            }
            self.wakeup_locked(&mut state);
            return;
        };

        let current_size = self.parent.size();
        let (new_size, optimistic) = match headers.limit {
            Some(limit) => (limit as i32, false),
            None => {
                // The endpoint tolerated one more concurrent call than the
                // optimistic estimate assumed; widen the ceiling by one.
                let widened = if current_size < 0 && current_size > MAX_OPTIMISTIC_PARALLELISM {
                    current_size - 1
                } else {
                    current_size
                };
                (widened, true)
            }
        };

        let mut allocates = 1u32;

        if new_size != current_size {
            self.parent.set_size(new_size);
            debug!(
                group_id = self.parent.group_id(),
                old_size = current_size,
                new_size,
                "rate limit group size updated"
            );

            let old_capacity = effective_size(current_size);
            let new_capacity = effective_size(new_size);
            if new_capacity > old_capacity {
                if !optimistic && current_size == -1 {
                    // First authoritative limit after an optimistic estimate:
                    // the ledger must reflect slots already consumed by
                    // requests made before the real limit was known.
                    let remaining = headers.remaining.unwrap_or(new_capacity);
                    allocates = new_capacity.saturating_sub(remaining);
                }

                let grown = (new_capacity - old_capacity) as i64;
                Self::release_waiters(&mut state, grown);
            }
        }

        let delay = if optimistic {
            OPTIMISTIC_DELAY
        } else {
            headers.delay()
        };
        let drop_at = Instant::now() + delay;
        state.drops.update_with(drop_at, allocates);

        match &state.wakeupper {
            Some(scheduled) if scheduled.when <= drop_at => {}
            _ => {
                if let Some(stale) = state.wakeupper.take() {
                    stale.task.abort();
                }
                self.schedule_wakeup(&mut state, drop_at);
            }
        }
    }

    /// Cooldown expiry callback: drop the expired bucket, rearm for the next
    /// one and release whatever capacity is now free.
    fn wakeup(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("handler state poisoned");
        state.wakeupper = None;
        self.wakeup_locked(&mut state);
    }

    fn wakeup_locked(self: &Arc<Self>, state: &mut HandlerState) {
        state.drops.pop_front();
        if let Some(next) = state.drops.front() {
            self.schedule_wakeup(state, next.drop);
        }

        let free = self.parent.effective_size() as i64
            - state.active as i64
            - state.drops.count() as i64;
        Self::release_waiters(state, free);
    }

    fn schedule_wakeup(self: &Arc<Self>, state: &mut HandlerState, when: Instant) {
        // Permits may be dropped on threads without an ambient runtime; a
        // panic inside `Drop` would abort, so skip rearming instead.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                group_id = self.parent.group_id(),
                limiter_id = self.limiter_id,
                "no runtime available, leaving the cooldown wakeup unscheduled"
            );
            return;
        };

        // The timer holds a weak reference so a pending cooldown does not keep
        // an otherwise unreachable handler alive.
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(when).await;
            if let Some(handler) = weak.upgrade() {
                handler.wakeup();
            }
        });
        state.wakeupper = Some(ScheduledWakeup { when, task });
    }

    fn release_waiters(state: &mut HandlerState, mut can_free: i64) {
        while can_free > 0 {
            let Some(sender) = state.queue.pop_front() else {
                break;
            };
            // A cancelled waiter is skipped without consuming capacity.
            if sender.send(()).is_ok() {
                can_free -= 1;
            }
        }
    }

    /// Current in-flight count.
    pub fn active(&self) -> u32 {
        self.state.lock().expect("handler state poisoned").active
    }

    /// Total slots reserved by unexpired cooldown buckets.
    pub fn count_drops(&self) -> u32 {
        self.state
            .lock()
            .expect("handler state poisoned")
            .drops
            .count()
    }

    /// Number of callers suspended in the queue.
    pub fn queued(&self) -> usize {
        self.state
            .lock()
            .expect("handler state poisoned")
            .queue
            .len()
    }

    /// Whether any caller ever entered this handler.
    pub fn has_info(&self) -> bool {
        self.state.lock().expect("handler state poisoned").entered
    }

    /// The earliest pending cooldown expiry, if any.
    pub fn next_reset_at(&self) -> Option<Instant> {
        self.state
            .lock()
            .expect("handler state poisoned")
            .drops
            .front()
            .map(|drop| drop.drop)
    }

    /// Time until the earliest pending cooldown expiry, zero when none.
    pub fn next_reset_after(&self) -> Duration {
        self.next_reset_at()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

impl PartialEq for RateLimitHandler {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RateLimitHandler {}

impl std::hash::Hash for RateLimitHandler {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Debug for RateLimitHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("handler state poisoned");
        f.debug_struct("RateLimitHandler")
            .field("group_id", &self.parent.group_id())
            .field("limiter", &self.parent.limiter())
            .field("limiter_id", &self.limiter_id)
            .field("size", &self.parent.size())
            .field("active", &state.active)
            .field("reserved", &state.drops.count())
            .field("queued", &state.queue.len())
            .finish()
    }
}

/// A scoped admission slot.
///
/// Every `enter` pairs with exactly one `exit`. Dropping the permit without an
/// explicit [`exit`](Self::exit) records a local failure, which releases
/// waiters without a cooldown. Dropping on a thread without a tokio runtime is
/// safe; a pending cooldown wakeup is left unscheduled there.
#[must_use = "dropping the permit immediately counts the request as failed"]
pub struct RateLimitPermit {
    handler: Arc<RateLimitHandler>,
    exited: bool,
}

impl RateLimitPermit {
    /// Complete the request with the response's rate limit headers.
    pub fn exit(mut self, headers: &RateLimitHeaders) {
        self.exited = true;
        self.handler.exit(Some(headers));
    }

    /// The handler this permit belongs to.
    pub fn handler(&self) -> &Arc<RateLimitHandler> {
        &self.handler
    }
}

impl Drop for RateLimitPermit {
    fn drop(&mut self) {
        if !self.exited {
            self.handler.exit(None);
        }
    }
}

impl std::fmt::Debug for RateLimitPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitPermit")
            .field("handler", &self.handler)
            .field("exited", &self.exited)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::group::GroupIdAllocator;

    fn limited_group(limit: i32) -> Arc<RateLimitGroup> {
        let allocator = GroupIdAllocator::new();
        let group = RateLimitGroup::new(&allocator, LimiterScope::Global, false);
        group.set_size(limit);
        group
    }

    fn headers_with_limit(limit: u32, remaining: u32, reset_after: f64) -> RateLimitHeaders {
        RateLimitHeaders {
            limit: Some(limit),
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            ..Default::default()
        }
    }

    async fn settled() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_within_size_never_suspends() {
        let handler = RateLimitHandler::new(limited_group(3), GLOBALLY_LIMITED);

        let first = handler.enter().await;
        let second = handler.enter().await;
        let third = handler.enter().await;
        assert_eq!(handler.active(), 3);
        assert_eq!(handler.queued(), 0);

        drop((first, second, third));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_entrant_suspends_until_capacity() {
        let handler = RateLimitHandler::new(limited_group(1), GLOBALLY_LIMITED);

        let permit = handler.enter().await;
        assert_eq!(handler.active(), 1);

        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move {
                let permit = handler.enter().await;
                drop(permit);
            })
        };
        settled().await;
        assert_eq!(handler.queued(), 1);
        assert!(!waiter.is_finished());

        // Local failure: fail-open releases the waiter with no cooldown.
        drop(permit);
        settled().await;
        waiter.await.unwrap();
        assert_eq!(handler.count_drops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_without_headers_releases_all_waiters() {
        let handler = RateLimitHandler::new(limited_group(3), GLOBALLY_LIMITED);

        let first = handler.enter().await;
        let second = handler.enter().await;
        let third = handler.enter().await;
        second.exit(&headers_with_limit(3, 1, 5.0));
        third.exit(&headers_with_limit(3, 0, 5.0));

        // active=1 with two slots in cooldown: the bucket is saturated.
        assert_eq!(handler.active(), 1);
        assert_eq!(handler.count_drops(), 2);

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let handler = handler.clone();
            waiters.push(tokio::spawn(async move {
                drop(handler.enter().await);
            }));
        }
        settled().await;
        assert_eq!(handler.queued(), 2);

        // The failure path frees both waiters at once, no cooldown recorded.
        drop(first);
        settled().await;
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(handler.count_drops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_reserve_slot_until_wakeup() {
        let handler = RateLimitHandler::new(limited_group(1), GLOBALLY_LIMITED);

        let permit = handler.enter().await;
        permit.exit(&headers_with_limit(1, 0, 2.0));

        assert_eq!(handler.active(), 0);
        assert_eq!(handler.count_drops(), 1);

        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move {
                drop(handler.enter().await);
            })
        };
        settled().await;
        assert_eq!(handler.queued(), 1);
        assert!(!waiter.is_finished());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        settled().await;
        assert!(!waiter.is_finished());

        tokio::time::sleep(Duration::from_millis(200)).await;
        settled().await;
        waiter.await.unwrap();
        assert_eq!(handler.count_drops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_real_limit_backfills_and_releases() {
        let allocator = GroupIdAllocator::new();
        let group = RateLimitGroup::new(&allocator, LimiterScope::Global, true);
        let handler = RateLimitHandler::new(group.clone(), GLOBALLY_LIMITED);
        assert_eq!(group.size(), -1);

        let permit = handler.enter().await;
        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move {
                drop(handler.enter().await);
            })
        };
        settled().await;
        assert_eq!(handler.queued(), 1);

        // Capacity grows from 1 to 5; the queued waiter is released right away.
        permit.exit(&headers_with_limit(5, 5, 3.0));
        settled().await;
        assert_eq!(group.size(), 5);
        assert_eq!(handler.queued(), 0);
        waiter.await.unwrap();

        // remaining=5 means nothing is consumed server-side: backfill is zero.
        assert_eq!(handler.count_drops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfill_reflects_consumed_slots() {
        let allocator = GroupIdAllocator::new();
        let group = RateLimitGroup::new(&allocator, LimiterScope::Global, true);
        let handler = RateLimitHandler::new(group.clone(), GLOBALLY_LIMITED);

        let permit = handler.enter().await;
        permit.exit(&headers_with_limit(5, 2, 3.0));

        assert_eq!(group.size(), 5);
        assert_eq!(handler.count_drops(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_headers_are_idempotent_on_size() {
        let handler = RateLimitHandler::new(limited_group(0), GLOBALLY_LIMITED);
        let group = handler.parent().clone();

        let permit = handler.enter().await;
        permit.exit(&headers_with_limit(5, 4, 2.0));
        assert_eq!(group.size(), 5);

        let permit = handler.enter().await;
        permit.exit(&headers_with_limit(5, 4, 2.0));
        assert_eq!(group.size(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_size_headerless_waits_out_optimistic_cooldown() {
        // size 0 is treated as 1: the second caller queues behind the first
        // and only the one second cooldown's wakeup releases it.
        let handler = RateLimitHandler::new(limited_group(0), GLOBALLY_LIMITED);

        let permit = handler.enter().await;
        let waiter = {
            let handler = handler.clone();
            tokio::spawn(async move {
                drop(handler.enter().await);
            })
        };
        settled().await;
        assert_eq!(handler.queued(), 1);

        permit.exit(&RateLimitHeaders::default());
        settled().await;
        assert!(!waiter.is_finished());

        tokio::time::sleep(Duration::from_millis(950)).await;
        settled().await;
        assert!(!waiter.is_finished());

        tokio::time::sleep(Duration::from_millis(100)).await;
        settled().await;
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_ceiling_widens_on_headerless_success() {
        let allocator = GroupIdAllocator::new();
        let group = RateLimitGroup::new(&allocator, LimiterScope::Global, true);
        let handler = RateLimitHandler::new(group.clone(), GLOBALLY_LIMITED);

        let permit = handler.enter().await;
        permit.exit(&RateLimitHeaders::default());
        assert_eq!(group.size(), -2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let permit = handler.enter().await;
        permit.exit(&RateLimitHeaders::default());
        assert_eq!(group.size(), -3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_blocks() {
        let handler = RateLimitHandler::new(RateLimitGroup::unlimited(), 0);

        for _ in 0..100 {
            let permit = handler.enter().await;
            drop(permit);
        }
        assert_eq!(handler.active(), 0);
        assert_eq!(handler.count_drops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_release_order() {
        let handler = RateLimitHandler::new(limited_group(1), GLOBALLY_LIMITED);
        let permit = handler.enter().await;

        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
        for index in 0..3 {
            let handler = handler.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let permit = handler.enter().await;
                done_tx.send(index).unwrap();
                drop(permit);
            });
            // Order queue insertion deterministically.
            settled().await;
        }
        assert_eq!(handler.queued(), 3);

        drop(permit);
        settled().await;

        let mut order = Vec::new();
        while let Ok(index) = done_rx.try_recv() {
            order.push(index);
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_does_not_consume_capacity() {
        let handler = RateLimitHandler::new(limited_group(1), GLOBALLY_LIMITED);
        let permit = handler.enter().await;

        let cancelled = {
            let handler = handler.clone();
            tokio::spawn(async move {
                drop(handler.enter().await);
            })
        };
        settled().await;
        let survivor = {
            let handler = handler.clone();
            tokio::spawn(async move {
                drop(handler.enter().await);
            })
        };
        settled().await;
        assert_eq!(handler.queued(), 2);

        cancelled.abort();
        settled().await;

        drop(permit);
        settled().await;
        survivor.await.unwrap();
    }

    #[test]
    fn test_permit_drop_outside_runtime_does_not_panic() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .build()
            .unwrap();

        let (handler, held) = runtime.block_on(async {
            let handler = RateLimitHandler::new(limited_group(4), GLOBALLY_LIMITED);
            let held = handler.enter().await;
            let first = handler.enter().await;
            let second = handler.enter().await;
            first.exit(&headers_with_limit(4, 2, 1.0));
            second.exit(&headers_with_limit(4, 1, 3.0));
            (handler, held)
        });

        // Two cooldown buckets pending: the failure path pops the first and
        // would rearm for the second on a thread with no runtime.
        std::thread::spawn(move || drop(held)).join().unwrap();

        assert_eq!(handler.active(), 0);
        assert_eq!(handler.count_drops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakeup_rearms_for_later_buckets() {
        let handler = RateLimitHandler::new(limited_group(4), GLOBALLY_LIMITED);

        let first = handler.enter().await;
        let second = handler.enter().await;
        first.exit(&headers_with_limit(4, 2, 1.0));
        second.exit(&headers_with_limit(4, 1, 3.0));

        assert_eq!(handler.count_drops(), 2);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        settled().await;
        assert_eq!(handler.count_drops(), 1);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        settled().await;
        assert_eq!(handler.count_drops(), 0);
    }
}
