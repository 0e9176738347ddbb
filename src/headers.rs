//! Parsing of Discord rate limit response headers.
//!
//! Discord reports the state of a rate limit bucket on every response:
//!
//! - `x-ratelimit-limit`: the bucket's total slot count
//! - `x-ratelimit-remaining`: slots left in the current window
//! - `x-ratelimit-reset`: absolute reset time as epoch seconds
//! - `x-ratelimit-reset-after`: relative reset time in seconds
//! - `date`: the server's wall clock (RFC 2822), used for skew correction
//!
//! Parsing is lenient: absent or malformed values become `None` and the
//! consumer degrades to whatever information is available.

use std::time::Duration;

use reqwest::header::{DATE, HeaderMap};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

/// Header carrying the bucket's total slot count.
pub const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the slots left in the current window.
pub const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying the absolute reset time as epoch seconds.
pub const RATELIMIT_RESET: &str = "x-ratelimit-reset";
/// Header carrying the relative reset time in seconds.
pub const RATELIMIT_RESET_AFTER: &str = "x-ratelimit-reset-after";

/// Cooldown length assumed when a response carries no usable reset timing.
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Rate limit information extracted from a single response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Total slot count of the bucket, when reported.
    pub limit: Option<u32>,
    /// Slots remaining in the current window, when reported.
    pub remaining: Option<u32>,
    /// Absolute reset time in epoch seconds, when reported.
    pub reset: Option<f64>,
    /// Relative reset time in seconds, when reported.
    pub reset_after: Option<f64>,
    /// The server's `Date` header, when present and well formed.
    pub date: Option<OffsetDateTime>,
}

impl RateLimitHeaders {
    /// Extract rate limit information from a response header map.
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            limit: parse_number(headers, RATELIMIT_LIMIT),
            remaining: parse_number(headers, RATELIMIT_REMAINING),
            reset: parse_number(headers, RATELIMIT_RESET),
            reset_after: parse_number(headers, RATELIMIT_RESET_AFTER),
            date: headers
                .get(DATE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| OffsetDateTime::parse(value, &Rfc2822).ok()),
        }
    }

    /// The cooldown window this response implies.
    ///
    /// Uses the earlier of the skew-corrected absolute reset (`reset` minus the
    /// server `Date`) and the relative `reset-after`. Falls back to whichever
    /// source is present, then to a 1 second default, and never goes negative.
    pub fn delay(&self) -> Duration {
        let skew_corrected = match (self.reset, self.date) {
            (Some(reset), Some(date)) => {
                let date_epoch = date.unix_timestamp_nanos() as f64 / 1_000_000_000.0;
                Some(reset - date_epoch)
            }
            _ => None,
        };

        let seconds = match (skew_corrected, self.reset_after) {
            (Some(corrected), Some(after)) => corrected.min(after),
            (Some(corrected), None) => corrected,
            (None, Some(after)) => after,
            (None, None) => return DEFAULT_DELAY,
        };

        if seconds <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(seconds)
        }
    }
}

fn parse_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
