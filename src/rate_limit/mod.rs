//! Rate limiting for the Discord HTTP API.
//!
//! Discord limits requests per endpoint class, with buckets scoped by
//! channel, guild or webhook, and reports the bucket state on every response.
//! This module provides the full admission-control pipeline:
//!
//! - [`RateLimitGroup`]: static per-endpoint-class metadata (scope, size)
//! - [`RateLimitHandler`]: runtime state of one bucket, with FIFO admission
//! - [`RateLimitProxy`]: user-facing handle resolving and inspecting a bucket
//! - [`RateLimitCoordinator`]: per-client registry and group catalog
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use discord_ratelimit::rate_limit::RateLimitCoordinator;
//! use discord_ratelimit::types::{ChannelId, LimitScope};
//!
//! # fn main() -> Result<(), discord_ratelimit::RateLimitError> {
//! let coordinator = Arc::new(RateLimitCoordinator::new());
//! let group = coordinator.groups().message_create.clone();
//!
//! let proxy = coordinator.proxy(
//!     &group,
//!     LimitScope::Channel {
//!         channel_id: ChannelId::new(123456789),
//!         guild_id: None,
//!     },
//!     false,
//! )?;
//! assert!(proxy.is_limited_by_channel());
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod group;
mod groups;
mod handler;
mod ledger;
mod proxy;
mod registry;

pub use coordinator::RateLimitCoordinator;
pub use group::{GroupIdAllocator, LimiterScope, RateLimitGroup};
pub use groups::RateLimitGroups;
pub use handler::{HandlerKey, RateLimitHandler, RateLimitPermit};
pub use proxy::RateLimitProxy;
pub use registry::HandlerRegistry;
