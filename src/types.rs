//! Identifier and scope types consumed by the rate limiter.
//!
//! Full entity modeling lives outside this crate; rate limiting only needs the
//! identifiers that select a limiter scope instance and the ownership relations
//! required to derive one (a message knows its channel, a channel may know its
//! guild, and so on).

use std::fmt;

/// A Discord snowflake identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Create a snowflake from its raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

macro_rules! id_type {
    ($(#[$doc:meta] $name:ident),+ $(,)?) => {
        $(
            #[$doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(Snowflake);

            impl $name {
                /// Create an identifier from its raw snowflake value.
                pub const fn new(value: u64) -> Self {
                    Self(Snowflake::new(value))
                }

                /// Get the raw snowflake value.
                pub const fn get(self) -> u64 {
                    self.0.get()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl From<u64> for $name {
                fn from(value: u64) -> Self {
                    Self::new(value)
                }
            }
        )+
    };
}

id_type! {
    /// Identifier of a channel.
    ChannelId,
    /// Identifier of a guild.
    GuildId,
    /// Identifier of a webhook.
    WebhookId,
}

/// The scope object a caller supplies when constructing a rate limit proxy.
///
/// Each variant carries exactly the relations needed to resolve a scope
/// instance: a channel-scoped group accepts a channel or a message (through its
/// channel), a guild-scoped group accepts anything with a known owning guild,
/// a webhook-scoped group accepts a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// No scope object; valid for globally limited and unlimited groups.
    None,
    /// A channel, optionally with its owning guild.
    Channel {
        /// The channel's identifier.
        channel_id: ChannelId,
        /// The owning guild, absent for private channels.
        guild_id: Option<GuildId>,
    },
    /// A message, identified through its containing channel.
    Message {
        /// The containing channel's identifier.
        channel_id: ChannelId,
        /// The owning guild, absent for private channels.
        guild_id: Option<GuildId>,
    },
    /// A guild.
    Guild {
        /// The guild's identifier.
        guild_id: GuildId,
    },
    /// A role, identified through its owning guild.
    Role {
        /// The owning guild, absent for partial role data.
        guild_id: Option<GuildId>,
    },
    /// A webhook, optionally with its owning guild.
    Webhook {
        /// The webhook's identifier.
        webhook_id: WebhookId,
        /// The owning guild, absent for token-only webhooks.
        guild_id: Option<GuildId>,
    },
}

impl LimitScope {
    /// Short description of the scope variant, used in error messages.
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            LimitScope::None => "empty",
            LimitScope::Channel { .. } => "channel",
            LimitScope::Message { .. } => "message",
            LimitScope::Guild { .. } => "guild",
            LimitScope::Role { .. } => "role",
            LimitScope::Webhook { .. } => "webhook",
        }
    }

    /// The owning guild carried by this scope, when known.
    pub(crate) fn guild_id(&self) -> Option<GuildId> {
        match *self {
            LimitScope::None => None,
            LimitScope::Channel { guild_id, .. }
            | LimitScope::Message { guild_id, .. }
            | LimitScope::Role { guild_id }
            | LimitScope::Webhook { guild_id, .. } => guild_id,
            LimitScope::Guild { guild_id } => Some(guild_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_roundtrip() {
        let id = Snowflake::new(123456789012345678);
        assert_eq!(id.get(), 123456789012345678);
        assert_eq!(id.to_string(), "123456789012345678");
    }

    #[test]
    fn test_id_types_are_distinct() {
        let channel = ChannelId::new(1);
        let guild = GuildId::new(1);
        assert_eq!(channel.get(), guild.get());
        // Distinct types; equality across them does not compile.
    }

    #[test]
    fn test_scope_guild_resolution() {
        let scope = LimitScope::Message {
            channel_id: ChannelId::new(10),
            guild_id: Some(GuildId::new(20)),
        };
        assert_eq!(scope.guild_id(), Some(GuildId::new(20)));

        let scope = LimitScope::Channel {
            channel_id: ChannelId::new(10),
            guild_id: None,
        };
        assert_eq!(scope.guild_id(), None);
    }
}
