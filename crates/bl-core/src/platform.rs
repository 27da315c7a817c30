use chrono::{DateTime, Utc};

use crate::domain::{ChannelId, GuildId, MessageId, UserId};
use crate::Result;

/// Gateway connectivity numbers included in crash/error reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectionStats {
    pub latency_ms: Option<u64>,
    pub ready_at: Option<DateTime<Utc>>,
}

/// Hexagonal port for the external chat platform.
///
/// This is exactly the surface the core consumes; everything else the
/// platform offers stays inside the adapter crate. Implementations map
/// their SDK errors into [`crate::Error::Platform`].
#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageId>;

    /// Fetch up to `limit` most recent message ids from a channel.
    async fn fetch_messages(&self, channel: ChannelId, limit: u16) -> Result<Vec<MessageId>>;

    /// Delete a batch of messages in one call.
    async fn bulk_delete(&self, channel: ChannelId, ids: &[MessageId]) -> Result<()>;

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<()>;

    async fn create_text_channel(&self, guild: GuildId, name: &str) -> Result<ChannelId>;

    /// Duplicate a channel's configuration into a fresh channel.
    async fn clone_channel(&self, channel: ChannelId) -> Result<ChannelId>;

    async fn ban_user(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()>;

    /// The guild's current ban list (the "fetched bans" resolution cache).
    async fn guild_bans(&self, guild: GuildId) -> Result<Vec<UserId>>;

    /// Look a user up by raw identifier; `None` when the platform does not
    /// know them.
    async fn user_by_id(&self, user: UserId) -> Result<Option<UserId>>;

    /// Exact-username lookup against whatever user cache the adapter keeps.
    async fn find_user_by_name(&self, name: &str) -> Result<Option<UserId>>;

    async fn is_member(&self, guild: GuildId, user: UserId) -> Result<bool>;

    /// Tear down the gateway connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    fn connection_stats(&self) -> ConnectionStats;
}
