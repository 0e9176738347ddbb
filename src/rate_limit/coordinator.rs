//! Per-client rate limit coordination.
//!
//! One coordinator is owned by each API client. It carries the state that
//! would otherwise be process-global: the shared handler registry and the
//! endpoint-class group catalog with its identifier allocation. Everything is
//! torn down with the client; descriptors revert to their static initial
//! sizes on restart.

use std::sync::Arc;

use crate::error::RateLimitError;
use crate::rate_limit::group::RateLimitGroup;
use crate::rate_limit::groups::RateLimitGroups;
use crate::rate_limit::proxy::RateLimitProxy;
use crate::rate_limit::registry::HandlerRegistry;
use crate::types::LimitScope;

/// Client-owned rate limit state: handler registry plus group catalog.
#[derive(Debug)]
pub struct RateLimitCoordinator {
    handlers: HandlerRegistry,
    groups: RateLimitGroups,
}

impl RateLimitCoordinator {
    /// Create a coordinator with a fresh group catalog.
    pub fn new() -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            groups: RateLimitGroups::new(),
        }
    }

    /// The shared handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// The endpoint-class group catalog.
    pub fn groups(&self) -> &RateLimitGroups {
        &self.groups
    }

    /// Resolve a proxy for an outgoing request.
    pub fn proxy(
        self: &Arc<Self>,
        group: &Arc<RateLimitGroup>,
        scope: LimitScope,
        keep_alive: bool,
    ) -> Result<RateLimitProxy, RateLimitError> {
        RateLimitProxy::new(self.clone(), group.clone(), scope, keep_alive)
    }
}

impl Default for RateLimitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
