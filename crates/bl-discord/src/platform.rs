use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use twilight_http::{error::ErrorType, request::AuditLogReason as _, Client};
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, MessageMarker, UserMarker},
    Id,
};

use bl_core::{
    domain::{ChannelId, GuildId, MessageId, UserId},
    errors::Error,
    platform::{ChatPlatform, ConnectionStats},
    supervisor::ProcessSupervisor,
    Result,
};

/// The ChatPlatform port over Discord's REST API.
///
/// Carries two small caches fed by the gateway loop: usernames seen in
/// events (Discord has no name-search endpoint) and guild owner ids.
/// `disconnect` cancels the token the gateway loop selects on.
pub struct DiscordPlatform {
    http: Arc<Client>,
    cancel: CancellationToken,
    supervisor: OnceLock<Arc<ProcessSupervisor>>,
    usernames: Mutex<HashMap<String, UserId>>,
    owners: Mutex<HashMap<GuildId, UserId>>,
    stats: Mutex<ConnectionStats>,
}

fn channel_id(id: ChannelId) -> Id<ChannelMarker> {
    Id::new(id.0)
}

fn guild_id(id: GuildId) -> Id<GuildMarker> {
    Id::new(id.0)
}

fn user_id(id: UserId) -> Id<UserMarker> {
    Id::new(id.0)
}

fn message_id(id: MessageId) -> Id<MessageMarker> {
    Id::new(id.0)
}

pub(crate) fn map_body_err(e: twilight_http::response::DeserializeBodyError) -> Error {
    Error::Platform(format!("discord response body: {e}"))
}

fn has_status(e: &twilight_http::Error, wanted: u16) -> bool {
    matches!(e.kind(), ErrorType::Response { status, .. } if status.get() == wanted)
}

fn is_not_found(e: &twilight_http::Error) -> bool {
    has_status(e, 404)
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DiscordPlatform {
    pub fn new(http: Arc<Client>) -> Self {
        Self {
            http,
            cancel: CancellationToken::new(),
            supervisor: OnceLock::new(),
            usernames: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    /// Wire the supervisor in after construction so rate-limit responses
    /// can be reported to it.
    pub fn set_supervisor(&self, supervisor: Arc<ProcessSupervisor>) {
        let _ = self.supervisor.set(supervisor);
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Map an API failure into the core error taxonomy. Rate-limit
    /// responses additionally go to the supervisor's observational hook.
    pub(crate) fn api_err(&self, e: twilight_http::Error) -> Error {
        if has_status(&e, 429) {
            if let Some(supervisor) = self.supervisor.get() {
                supervisor.on_rate_limit(&e.to_string());
            }
        }
        Error::Platform(format!("discord api: {e}"))
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn note_ready(&self) {
        locked(&self.stats).ready_at = Some(Utc::now());
    }

    pub(crate) fn note_latency(&self, ms: u64) {
        locked(&self.stats).latency_ms = Some(ms);
    }

    pub(crate) fn remember_user(&self, name: &str, id: UserId) {
        locked(&self.usernames).insert(name.to_string(), id);
    }

    pub(crate) fn remember_owner(&self, guild: GuildId, owner: UserId) {
        locked(&self.owners).insert(guild, owner);
    }

    /// The guild's owner id, from the gateway cache when possible.
    pub(crate) async fn guild_owner(&self, guild: GuildId) -> Result<UserId> {
        if let Some(&owner) = locked(&self.owners).get(&guild) {
            return Ok(owner);
        }

        let fetched = self
            .http
            .guild(guild_id(guild))
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        let owner = UserId(fetched.owner_id.get());
        self.remember_owner(guild, owner);
        Ok(owner)
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageId> {
        let message = self
            .http
            .create_message(channel_id(channel))
            .content(text)
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(MessageId(message.id.get()))
    }

    async fn fetch_messages(&self, channel: ChannelId, limit: u16) -> Result<Vec<MessageId>> {
        let messages = self
            .http
            .channel_messages(channel_id(channel))
            .limit(limit)
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(messages.iter().map(|m| MessageId(m.id.get())).collect())
    }

    async fn bulk_delete(&self, channel: ChannelId, ids: &[MessageId]) -> Result<()> {
        // The bulk endpoint rejects single-message batches.
        if let [only] = ids {
            self.http
                .delete_message(channel_id(channel), message_id(*only))
                .await
                .map_err(|e| self.api_err(e))?;
            return Ok(());
        }

        let ids: Vec<Id<MessageMarker>> = ids.iter().copied().map(message_id).collect();
        self.http
            .delete_messages(channel_id(channel), &ids)
            .await
            .map_err(|e| self.api_err(e))?;
        Ok(())
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        let channels = self
            .http
            .guild_channels(guild_id(guild))
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(channels.iter().map(|c| ChannelId(c.id.get())).collect())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        self.http
            .delete_channel(channel_id(channel))
            .await
            .map_err(|e| self.api_err(e))?;
        Ok(())
    }

    async fn create_text_channel(&self, guild: GuildId, name: &str) -> Result<ChannelId> {
        let created = self
            .http
            .create_guild_channel(guild_id(guild), name)
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(ChannelId(created.id.get()))
    }

    async fn clone_channel(&self, channel: ChannelId) -> Result<ChannelId> {
        let original = self
            .http
            .channel(channel_id(channel))
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;

        let Some(guild) = original.guild_id else {
            return Err(Error::Platform(format!(
                "channel {channel} does not belong to a guild"
            )));
        };
        let name = original.name.unwrap_or_else(|| "channel".to_string());

        let mut request = self
            .http
            .create_guild_channel(guild, &name)
            .kind(original.kind);
        if let Some(topic) = original.topic.as_deref() {
            request = request.topic(topic);
        }
        if let Some(nsfw) = original.nsfw {
            request = request.nsfw(nsfw);
        }
        if let Some(parent) = original.parent_id {
            request = request.parent_id(parent);
        }

        let created = request
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(ChannelId(created.id.get()))
    }

    async fn ban_user(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()> {
        self.http
            .create_ban(guild_id(guild), user_id(user))
            .reason(reason)
            .await
            .map_err(|e| self.api_err(e))?;
        Ok(())
    }

    async fn guild_bans(&self, guild: GuildId) -> Result<Vec<UserId>> {
        let bans = self
            .http
            .bans(guild_id(guild))
            .await
            .map_err(|e| self.api_err(e))?
            .model()
            .await
            .map_err(map_body_err)?;
        Ok(bans.iter().map(|b| UserId(b.user.id.get())).collect())
    }

    async fn user_by_id(&self, user: UserId) -> Result<Option<UserId>> {
        match self.http.user(user_id(user)).await {
            Ok(response) => {
                let fetched = response.model().await.map_err(map_body_err)?;
                self.remember_user(&fetched.name, user);
                Ok(Some(user))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(self.api_err(e)),
        }
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<UserId>> {
        Ok(locked(&self.usernames).get(name).copied())
    }

    async fn is_member(&self, guild: GuildId, user: UserId) -> Result<bool> {
        match self.http.guild_member(guild_id(guild), user_id(user)).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(self.api_err(e)),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }

    fn connection_stats(&self) -> ConnectionStats {
        *locked(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_answer_without_http() {
        let platform = DiscordPlatform::new(Arc::new(Client::new(String::new())));

        platform.remember_user("Troublemaker", UserId(7));
        platform.remember_owner(GuildId(1), UserId(9));

        assert_eq!(
            locked(&platform.usernames).get("Troublemaker"),
            Some(&UserId(7))
        );
        assert_eq!(locked(&platform.owners).get(&GuildId(1)), Some(&UserId(9)));
    }

    #[test]
    fn disconnect_cancels_the_gateway_token() {
        let platform = DiscordPlatform::new(Arc::new(Client::new(String::new())));
        let token = platform.cancel_token();

        platform.cancel.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn rate_limit_notices_leave_the_supervisor_running() {
        use bl_core::settings::SettingsStore;
        use bl_core::supervisor::{ProcessControl, SupervisorOptions, SupervisorState};
        use std::path::PathBuf;
        use std::time::Duration;

        struct NoExit;
        impl ProcessControl for NoExit {
            fn exit(&self, _code: i32) {}
        }

        let base = PathBuf::from(format!(
            "/tmp/bl-discord-rl-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let settings = Arc::new(SettingsStore::load(base.join("settings.json")).unwrap());
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::new(NoExit),
            settings,
            SupervisorOptions {
                pid_file: base.join("bot.pid"),
                report_base: base.clone(),
                report_channel: None,
                commit: None,
                countdown: Duration::from_secs(5),
            },
        ));

        let platform = DiscordPlatform::new(Arc::new(Client::new(String::new())));
        platform.set_supervisor(supervisor.clone());

        // Observational only: the process keeps running and nothing else
        // in the supervisor changes.
        if let Some(wired) = platform.supervisor.get() {
            wired.on_rate_limit("429 on create_message");
        }
        assert_eq!(supervisor.state(), SupervisorState::Running);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn stats_reflect_gateway_notes() {
        let platform = DiscordPlatform::new(Arc::new(Client::new(String::new())));
        assert!(platform.connection_stats().ready_at.is_none());

        platform.note_ready();
        platform.note_latency(42);

        let stats = platform.connection_stats();
        assert!(stats.ready_at.is_some());
        assert_eq!(stats.latency_ms, Some(42));
    }
}
