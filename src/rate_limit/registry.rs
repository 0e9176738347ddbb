//! Shared handler registry.
//!
//! One handler per `(group, scope instance)` pair is shared between everything
//! that talks to the same server-side bucket. The registry holds weak
//! references only: a handler lives exactly as long as permits, proxies or
//! pinning callers hold it, and dead entries are purged opportunistically on
//! insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::rate_limit::handler::{HandlerKey, RateLimitHandler};

/// Weak-value map from handler identity to the shared handler instance.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    inner: Mutex<HashMap<HandlerKey, Weak<RateLimitHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live shared handler for a key.
    pub fn get(&self, key: HandlerKey) -> Option<Arc<RateLimitHandler>> {
        self.inner
            .lock()
            .expect("handler registry poisoned")
            .get(&key)
            .and_then(Weak::upgrade)
    }

    /// Register a handler, adopting an already-registered live one instead.
    ///
    /// Returns the canonical shared instance for the handler's key.
    pub fn set(&self, handler: Arc<RateLimitHandler>) -> Arc<RateLimitHandler> {
        let mut inner = self.inner.lock().expect("handler registry poisoned");
        inner.retain(|_, weak| weak.strong_count() > 0);

        let key = handler.key();
        if let Some(existing) = inner.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        inner.insert(key, Arc::downgrade(&handler));
        handler
    }

    /// Number of live registered handlers.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("handler registry poisoned")
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
