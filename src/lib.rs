//! # Discord Ratelimit
//!
//! Header-driven rate limiting for the Discord HTTP API.
//!
//! Discord paces clients through response headers (`x-ratelimit-limit`,
//! `x-ratelimit-remaining`, `x-ratelimit-reset`, `x-ratelimit-reset-after`).
//! This crate turns those headers into per-endpoint admission control: a caller
//! acquires a slot before issuing a request, and the response headers decide
//! when that slot becomes available again.
//!
//! ## Features
//!
//! - Per-endpoint-class rate limit groups scoped by channel, guild or webhook
//! - FIFO admission with bounded asynchronous delay, never an error
//! - Cooldown tracking with sparse time-bucket coalescing
//! - Self-healing concurrency ceilings learned from server responses
//! - Scoped permits that release on every exit path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use discord_ratelimit::RateLimitHeaders;
//! use discord_ratelimit::rate_limit::RateLimitCoordinator;
//! use discord_ratelimit::types::{ChannelId, LimitScope};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Arc::new(RateLimitCoordinator::new());
//!     let group = coordinator.groups().message_create.clone();
//!
//!     let scope = LimitScope::Channel {
//!         channel_id: ChannelId::new(123456789),
//!         guild_id: None,
//!     };
//!     let proxy = coordinator.proxy(&group, scope, false)?;
//!
//!     let permit = proxy.handler_or_create().enter().await;
//!     // ... perform the HTTP request here, then feed back its headers ...
//!     let headers = RateLimitHeaders::default();
//!     permit.exit(&headers);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod headers;
pub mod rate_limit;
pub mod types;

// Re-export commonly used types at crate root
pub use error::RateLimitError;
pub use headers::RateLimitHeaders;
pub use rate_limit::{RateLimitCoordinator, RateLimitGroup, RateLimitHandler, RateLimitProxy};

/// Result type alias using RateLimitError
pub type Result<T> = std::result::Result<T, RateLimitError>;
