//! Error types for the rate limit library.

use thiserror::Error;

use crate::rate_limit::LimiterScope;

/// The main error type for all rate limit operations.
///
/// Rate limiting itself never fails: callers experience it as bounded
/// asynchronous delay. These errors cover programmer mistakes caught at proxy
/// construction time and misuse of the proxy lifecycle API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// The supplied scope object cannot satisfy the group's limiter scope,
    /// e.g. a guild was passed for a channel-scoped group.
    #[error("rate limit group is scoped by {limiter}, which cannot be resolved from a {supplied} scope")]
    ScopeMismatch {
        /// The limiter scope the group requires.
        limiter: LimiterScope,
        /// Description of the scope object the caller supplied.
        supplied: &'static str,
    },

    /// A guild-scoped group received a scope object without a known owning
    /// guild, e.g. a private channel.
    #[error("cannot resolve the owning guild from the supplied {supplied} scope")]
    MissingGuild {
        /// Description of the scope object the caller supplied.
        supplied: &'static str,
    },

    /// `wait_till_limits_expire` was called while `keep_alive` is enabled.
    ///
    /// A pinned handler is never replaced by identity, so the wait could
    /// never complete.
    #[error("cannot use `wait_till_limits_expire` while `keep_alive` is enabled")]
    KeepAliveActive,
}
