//! The per-endpoint-class group catalog.
//!
//! One descriptor per Discord HTTP endpoint class, created at coordinator
//! construction. Endpoint families that share a server-side bucket share one
//! descriptor (reaction modification, pin modification, member modification,
//! member role modification). Optimistic groups cover endpoints that have
//! never been observed to send limit headers; unlimited groups cover
//! endpoints documented to carry no limit at all.

use std::sync::Arc;

use crate::rate_limit::group::{GroupIdAllocator, LimiterScope, RateLimitGroup};

/// Static descriptor table for the Discord HTTP API.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct RateLimitGroups {
    // Shared buckets.
    pub reaction_modify: Arc<RateLimitGroup>,
    pub pin_modify: Arc<RateLimitGroup>,
    pub user_modify: Arc<RateLimitGroup>,
    pub user_role_modify: Arc<RateLimitGroup>,

    // Application endpoints.
    pub oauth2_token: Arc<RateLimitGroup>,
    pub application_get: Arc<RateLimitGroup>,
    pub achievement_get_all: Arc<RateLimitGroup>,
    pub achievement_create: Arc<RateLimitGroup>,
    pub achievement_delete: Arc<RateLimitGroup>,
    pub achievement_get: Arc<RateLimitGroup>,
    pub achievement_edit: Arc<RateLimitGroup>,

    // Channel endpoints.
    pub channel_delete: Arc<RateLimitGroup>,
    pub channel_edit: Arc<RateLimitGroup>,
    pub channel_follow: Arc<RateLimitGroup>,
    pub invite_get_channel: Arc<RateLimitGroup>,
    pub invite_create: Arc<RateLimitGroup>,

    // Message endpoints.
    pub message_logs: Arc<RateLimitGroup>,
    pub message_create: Arc<RateLimitGroup>,
    pub message_delete_multiple: Arc<RateLimitGroup>,
    pub message_delete: Arc<RateLimitGroup>,
    pub message_delete_backlog: Arc<RateLimitGroup>,
    pub message_get: Arc<RateLimitGroup>,
    pub message_edit: Arc<RateLimitGroup>,
    pub message_crosspost: Arc<RateLimitGroup>,
    pub message_suppress_embeds: Arc<RateLimitGroup>,

    // Reaction endpoints, all sharing one bucket.
    pub reaction_clear: Arc<RateLimitGroup>,
    pub reaction_delete_emoji: Arc<RateLimitGroup>,
    pub reaction_users: Arc<RateLimitGroup>,
    pub reaction_delete_own: Arc<RateLimitGroup>,
    pub reaction_add: Arc<RateLimitGroup>,
    pub reaction_delete: Arc<RateLimitGroup>,

    // Permission overwrite endpoints.
    pub permission_overwrite_delete: Arc<RateLimitGroup>,
    pub permission_overwrite_create: Arc<RateLimitGroup>,

    // Pin endpoints.
    pub channel_pins: Arc<RateLimitGroup>,
    pub message_unpin: Arc<RateLimitGroup>,
    pub message_pin: Arc<RateLimitGroup>,

    pub typing: Arc<RateLimitGroup>,
    pub webhook_get_channel: Arc<RateLimitGroup>,
    pub webhook_create: Arc<RateLimitGroup>,
    pub client_gateway_bot: Arc<RateLimitGroup>,

    // Guild endpoints.
    pub guild_create: Arc<RateLimitGroup>,
    pub guild_delete: Arc<RateLimitGroup>,
    pub guild_get: Arc<RateLimitGroup>,
    pub guild_edit: Arc<RateLimitGroup>,
    pub audit_logs: Arc<RateLimitGroup>,
    pub guild_bans: Arc<RateLimitGroup>,
    pub guild_ban_delete: Arc<RateLimitGroup>,
    pub guild_ban_get: Arc<RateLimitGroup>,
    pub guild_ban_add: Arc<RateLimitGroup>,
    pub guild_channels: Arc<RateLimitGroup>,
    pub channel_move: Arc<RateLimitGroup>,
    pub channel_create: Arc<RateLimitGroup>,
    pub guild_emojis: Arc<RateLimitGroup>,
    pub emoji_create: Arc<RateLimitGroup>,
    pub emoji_delete: Arc<RateLimitGroup>,
    pub emoji_get: Arc<RateLimitGroup>,
    pub emoji_edit: Arc<RateLimitGroup>,
    pub invite_get_guild: Arc<RateLimitGroup>,
    pub guild_users: Arc<RateLimitGroup>,
    pub client_edit_nick: Arc<RateLimitGroup>,
    pub guild_user_delete: Arc<RateLimitGroup>,
    pub guild_user_get: Arc<RateLimitGroup>,
    pub user_edit: Arc<RateLimitGroup>,
    pub user_move: Arc<RateLimitGroup>,
    pub guild_user_add: Arc<RateLimitGroup>,
    pub user_role_delete: Arc<RateLimitGroup>,
    pub user_role_add: Arc<RateLimitGroup>,
    pub guild_user_search: Arc<RateLimitGroup>,
    pub guild_preview: Arc<RateLimitGroup>,
    pub guild_prune_estimate: Arc<RateLimitGroup>,
    pub guild_prune: Arc<RateLimitGroup>,
    pub guild_regions: Arc<RateLimitGroup>,
    pub guild_roles: Arc<RateLimitGroup>,
    pub role_move: Arc<RateLimitGroup>,
    pub role_create: Arc<RateLimitGroup>,
    pub role_delete: Arc<RateLimitGroup>,
    pub role_edit: Arc<RateLimitGroup>,
    pub vanity_get: Arc<RateLimitGroup>,
    pub webhook_get_guild: Arc<RateLimitGroup>,
    pub guild_widget_get: Arc<RateLimitGroup>,

    // Invite endpoints.
    pub invite_delete: Arc<RateLimitGroup>,
    pub invite_get: Arc<RateLimitGroup>,

    // User and client endpoints.
    pub client_application_info: Arc<RateLimitGroup>,
    pub client_user: Arc<RateLimitGroup>,
    pub client_edit: Arc<RateLimitGroup>,
    pub channel_private_get_all: Arc<RateLimitGroup>,
    pub channel_private_create: Arc<RateLimitGroup>,
    pub client_connections: Arc<RateLimitGroup>,
    pub guild_get_all: Arc<RateLimitGroup>,
    pub guild_leave: Arc<RateLimitGroup>,
    pub user_get: Arc<RateLimitGroup>,

    // Webhook endpoints.
    pub webhook_delete: Arc<RateLimitGroup>,
    pub webhook_get: Arc<RateLimitGroup>,
    pub webhook_edit: Arc<RateLimitGroup>,
    pub webhook_delete_token: Arc<RateLimitGroup>,
    pub webhook_get_token: Arc<RateLimitGroup>,
    pub webhook_edit_token: Arc<RateLimitGroup>,
    pub webhook_send: Arc<RateLimitGroup>,
}

impl RateLimitGroups {
    /// Build the catalog, allocating group identifiers in declaration order.
    pub fn new() -> Self {
        let allocator = GroupIdAllocator::new();
        let unlimited = RateLimitGroup::unlimited();

        let channel = |optimistic| RateLimitGroup::new(&allocator, LimiterScope::Channel, optimistic);
        let guild = |optimistic| RateLimitGroup::new(&allocator, LimiterScope::Guild, optimistic);
        let webhook = |optimistic| RateLimitGroup::new(&allocator, LimiterScope::Webhook, optimistic);
        let global = |optimistic| RateLimitGroup::new(&allocator, LimiterScope::Global, optimistic);

        let reaction_modify = channel(false);
        let pin_modify = channel(false);
        let user_modify = guild(false);
        let user_role_modify = guild(false);

        Self {
            reaction_modify: reaction_modify.clone(),
            pin_modify: pin_modify.clone(),
            user_modify: user_modify.clone(),
            user_role_modify: user_role_modify.clone(),

            oauth2_token: global(true),
            application_get: global(false),
            achievement_get_all: global(false),
            achievement_create: global(false),
            achievement_delete: global(false),
            achievement_get: global(false),
            achievement_edit: global(false),

            channel_delete: unlimited.clone(),
            channel_edit: channel(false),
            channel_follow: channel(true),
            invite_get_channel: channel(true),
            invite_create: global(false),

            message_logs: channel(true),
            message_create: channel(false),
            message_delete_multiple: channel(false),
            message_delete: channel(false),
            message_delete_backlog: channel(false),
            message_get: channel(true),
            message_edit: channel(false),
            message_crosspost: channel(false),
            message_suppress_embeds: global(false),

            reaction_clear: reaction_modify.clone(),
            reaction_delete_emoji: reaction_modify.clone(),
            reaction_users: channel(true),
            reaction_delete_own: reaction_modify.clone(),
            reaction_add: reaction_modify.clone(),
            reaction_delete: reaction_modify,

            permission_overwrite_delete: channel(true),
            permission_overwrite_create: channel(true),

            channel_pins: global(false),
            message_unpin: pin_modify.clone(),
            message_pin: pin_modify,

            typing: channel(false),
            webhook_get_channel: channel(true),
            webhook_create: channel(true),
            client_gateway_bot: global(false),

            guild_create: unlimited.clone(),
            guild_delete: unlimited.clone(),
            guild_get: guild(true),
            guild_edit: guild(true),
            audit_logs: guild(true),
            guild_bans: guild(true),
            guild_ban_delete: guild(true),
            guild_ban_get: guild(true),
            guild_ban_add: guild(true),
            guild_channels: guild(true),
            channel_move: guild(true),
            channel_create: guild(true),
            guild_emojis: guild(true),
            emoji_create: guild(false),
            emoji_delete: guild(false),
            emoji_get: guild(true),
            emoji_edit: global(false),
            invite_get_guild: guild(true),
            guild_users: guild(false),
            client_edit_nick: global(false),
            guild_user_delete: guild(false),
            guild_user_get: guild(false),
            user_edit: user_modify.clone(),
            user_move: user_modify,
            guild_user_add: guild(false),
            user_role_delete: user_role_modify.clone(),
            user_role_add: user_role_modify,
            guild_user_search: guild(false),
            guild_preview: global(false),
            guild_prune_estimate: guild(true),
            guild_prune: guild(true),
            guild_regions: guild(true),
            guild_roles: guild(true),
            role_move: guild(true),
            role_create: guild(false),
            role_delete: guild(true),
            role_edit: guild(false),
            vanity_get: guild(true),
            webhook_get_guild: guild(true),
            guild_widget_get: unlimited.clone(),

            invite_delete: unlimited.clone(),
            invite_get: global(false),

            client_application_info: global(true),
            client_user: global(true),
            client_edit: global(false),
            channel_private_get_all: global(true),
            channel_private_create: unlimited.clone(),
            client_connections: global(true),
            guild_get_all: global(false),
            guild_leave: unlimited.clone(),
            user_get: global(false),

            webhook_delete: unlimited.clone(),
            webhook_get: unlimited.clone(),
            webhook_edit: webhook(true),
            webhook_delete_token: unlimited.clone(),
            webhook_get_token: unlimited,
            webhook_edit_token: webhook(true),
            webhook_send: webhook(false),
        }
    }
}

impl Default for RateLimitGroups {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_buckets_share_descriptors() {
        let groups = RateLimitGroups::new();

        assert!(Arc::ptr_eq(&groups.reaction_add, &groups.reaction_delete));
        assert!(Arc::ptr_eq(&groups.reaction_add, &groups.reaction_clear));
        assert!(Arc::ptr_eq(&groups.message_pin, &groups.message_unpin));
        assert!(Arc::ptr_eq(&groups.user_edit, &groups.user_move));
        assert!(Arc::ptr_eq(&groups.user_role_add, &groups.user_role_delete));
    }

    #[test]
    fn test_unlimited_endpoints_share_the_unlimited_group() {
        let groups = RateLimitGroups::new();

        assert!(groups.channel_delete.is_unlimited());
        assert!(groups.webhook_get.is_unlimited());
        assert!(Arc::ptr_eq(&groups.channel_delete, &groups.guild_create));
    }

    #[test]
    fn test_distinct_groups_have_distinct_identifiers() {
        let groups = RateLimitGroups::new();

        assert_ne!(
            groups.message_create.group_id(),
            groups.message_edit.group_id()
        );
        assert_ne!(groups.message_create.group_id(), 0);
    }

    #[test]
    fn test_scopes_match_endpoint_classes() {
        let groups = RateLimitGroups::new();

        assert_eq!(groups.message_create.limiter(), LimiterScope::Channel);
        assert_eq!(groups.guild_users.limiter(), LimiterScope::Guild);
        assert_eq!(groups.webhook_send.limiter(), LimiterScope::Webhook);
        assert_eq!(groups.user_get.limiter(), LimiterScope::Global);
        assert_eq!(groups.channel_delete.limiter(), LimiterScope::Unlimited);
    }

    #[test]
    fn test_optimistic_groups_start_negative() {
        let groups = RateLimitGroups::new();

        assert_eq!(groups.message_get.size(), -1);
        assert_eq!(groups.message_create.size(), 0);
    }
}
