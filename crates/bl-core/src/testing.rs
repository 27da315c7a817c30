//! In-memory fakes shared by the in-module test suites.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::dispatcher::OpContext;
use crate::domain::{ChannelId, GuildId, MessageId, UserId};
use crate::event::{Actor, GuildRef, InboundEvent};
use crate::gate::Permissions;
use crate::ledger::ModerationLedger;
use crate::platform::{ChatPlatform, ConnectionStats};
use crate::purge::PurgeEngine;
use crate::settings::SettingsStore;
use crate::supervisor::{ProcessControl, ProcessSupervisor, SupervisorOptions};
use crate::{errors::Error, Result};

#[derive(Default)]
struct FakeState {
    messages: HashMap<ChannelId, Vec<MessageId>>,
    guild_channels: HashMap<GuildId, Vec<ChannelId>>,
    users: HashMap<UserId, String>,
    members: HashMap<GuildId, Vec<UserId>>,
    bans: HashMap<GuildId, Vec<UserId>>,

    sent: Vec<(ChannelId, String)>,
    platform_bans: Vec<(GuildId, UserId, String)>,
    fetch_limits: Vec<u16>,
    bulk_delete_sizes: Vec<usize>,
    deleted_channels: Vec<ChannelId>,
    created_channels: Vec<String>,
    disconnects: usize,

    fail_bulk_deletes: usize,
    fail_clone: bool,
    fail_ban: bool,
    failing_channel_deletes: Vec<ChannelId>,
}

/// A scriptable in-memory stand-in for the chat platform.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    next_id: AtomicU64,
}

impl FakePlatform {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1_000_000
    }

    pub fn seed_messages(&self, channel: ChannelId, count: usize) {
        let mut state = self.state.lock().unwrap();
        let ids = (0..count).map(|_| MessageId(self.next())).collect();
        state.messages.insert(channel, ids);
    }

    pub fn seed_guild(&self, guild: GuildId, channels: Vec<ChannelId>) {
        self.state.lock().unwrap().guild_channels.insert(guild, channels);
    }

    pub fn seed_user(&self, id: UserId, name: &str) {
        self.state.lock().unwrap().users.insert(id, name.to_string());
    }

    pub fn seed_member(&self, guild: GuildId, user: UserId) {
        self.state
            .lock()
            .unwrap()
            .members
            .entry(guild)
            .or_default()
            .push(user);
    }

    pub fn seed_ban(&self, guild: GuildId, user: UserId) {
        self.state
            .lock()
            .unwrap()
            .bans
            .entry(guild)
            .or_default()
            .push(user);
    }

    pub fn fail_bulk_deletes(&self, count: usize) {
        self.state.lock().unwrap().fail_bulk_deletes = count;
    }

    pub fn fail_clone_channel(&self) {
        self.state.lock().unwrap().fail_clone = true;
    }

    pub fn fail_ban(&self) {
        self.state.lock().unwrap().fail_ban = true;
    }

    pub fn fail_channel_delete(&self, channel: ChannelId) {
        self.state.lock().unwrap().failing_channel_deletes.push(channel);
    }

    pub fn fetch_limits(&self) -> Vec<u16> {
        self.state.lock().unwrap().fetch_limits.clone()
    }

    pub fn bulk_delete_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().bulk_delete_sizes.clone()
    }

    pub fn remaining_messages(&self, channel: ChannelId) -> usize {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.state.lock().unwrap().deleted_channels.clone()
    }

    pub fn created_channels(&self) -> Vec<String> {
        self.state.lock().unwrap().created_channels.clone()
    }

    pub fn sent_messages(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn platform_bans(&self) -> Vec<(GuildId, UserId, String)> {
        self.state.lock().unwrap().platform_bans.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }
}

#[async_trait::async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<MessageId> {
        self.state.lock().unwrap().sent.push((channel, text.to_string()));
        Ok(MessageId(self.next()))
    }

    async fn fetch_messages(&self, channel: ChannelId, limit: u16) -> Result<Vec<MessageId>> {
        let mut state = self.state.lock().unwrap();
        state.fetch_limits.push(limit);
        let ids = state.messages.get(&channel).cloned().unwrap_or_default();
        let take = (limit as usize).min(ids.len());
        Ok(ids[ids.len() - take..].to_vec())
    }

    async fn bulk_delete(&self, channel: ChannelId, ids: &[MessageId]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_bulk_deletes > 0 {
            state.fail_bulk_deletes -= 1;
            return Err(Error::Platform("bulk delete rejected".to_string()));
        }
        state.bulk_delete_sizes.push(ids.len());
        if let Some(existing) = state.messages.get_mut(&channel) {
            existing.retain(|id| !ids.contains(id));
        }
        Ok(())
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .guild_channels
            .get(&guild)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_channel_deletes.contains(&channel) {
            return Err(Error::Platform("missing access".to_string()));
        }
        state.deleted_channels.push(channel);
        Ok(())
    }

    async fn create_text_channel(&self, _guild: GuildId, name: &str) -> Result<ChannelId> {
        self.state.lock().unwrap().created_channels.push(name.to_string());
        Ok(ChannelId(self.next()))
    }

    async fn clone_channel(&self, _channel: ChannelId) -> Result<ChannelId> {
        if self.state.lock().unwrap().fail_clone {
            return Err(Error::Platform("clone rejected".to_string()));
        }
        Ok(ChannelId(self.next()))
    }

    async fn ban_user(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_ban {
            return Err(Error::Platform("missing permissions".to_string()));
        }
        state.platform_bans.push((guild, user, reason.to_string()));
        Ok(())
    }

    async fn guild_bans(&self, guild: GuildId) -> Result<Vec<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bans
            .get(&guild)
            .cloned()
            .unwrap_or_default())
    }

    async fn user_by_id(&self, user: UserId) -> Result<Option<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .contains_key(&user)
            .then_some(user))
    }

    async fn find_user_by_name(&self, name: &str) -> Result<Option<UserId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id))
    }

    async fn is_member(&self, guild: GuildId, user: UserId) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(&guild)
            .map(|members| members.contains(&user))
            .unwrap_or(false))
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.lock().unwrap().disconnects += 1;
        Ok(())
    }

    fn connection_stats(&self) -> ConnectionStats {
        ConnectionStats::default()
    }
}

/// Records exit codes instead of terminating the test process.
#[derive(Default)]
pub struct FakeControl {
    codes: Mutex<Vec<i32>>,
}

impl FakeControl {
    pub fn exit_codes(&self) -> Vec<i32> {
        self.codes.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeControl {
    fn exit(&self, code: i32) {
        self.codes.lock().unwrap().push(code);
    }
}

/// A fully wired [`OpContext`] over fakes, plus handles to inspect them.
pub struct TestContext {
    pub ctx: OpContext,
    pub platform: Arc<FakePlatform>,
    pub control: Arc<FakeControl>,
    pub base: PathBuf,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

pub fn test_context() -> TestContext {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let base = PathBuf::from(format!("/tmp/bl-testctx-{}-{ts}", std::process::id()));
    std::fs::create_dir_all(&base).unwrap();

    let platform = Arc::new(FakePlatform::default());
    let control = Arc::new(FakeControl::default());
    let settings = Arc::new(SettingsStore::load(base.join("settings.json")).unwrap());
    let ledger = Arc::new(ModerationLedger::new());
    let purge = Arc::new(PurgeEngine::new(
        platform.clone() as Arc<dyn ChatPlatform>,
        settings.clone(),
        Duration::from_millis(1),
    ));
    let supervisor = Arc::new(ProcessSupervisor::new(
        control.clone(),
        settings.clone(),
        SupervisorOptions {
            pid_file: base.join("bot.pid"),
            report_base: base.clone(),
            report_channel: None,
            commit: None,
            countdown: Duration::from_millis(50),
        },
    ));
    supervisor.set_platform(platform.clone());

    TestContext {
        ctx: OpContext {
            platform: platform.clone(),
            ledger,
            purge,
            settings,
            supervisor,
        },
        platform,
        control,
        base,
    }
}

/// An event invoking `command` with the default prefix, from a non-bot
/// administrator inside guild 1001 (owner 9001), channel 500.
pub fn test_event(command: &str) -> InboundEvent {
    InboundEvent {
        content: format!("bl!{command}"),
        actor: Actor {
            id: UserId(1),
            username: "moderator".to_string(),
            is_bot: false,
            permissions: Permissions::ADMINISTRATOR,
        },
        channel_id: ChannelId(500),
        guild: Some(GuildRef {
            id: GuildId(1001),
            owner_id: UserId(9001),
            available: true,
        }),
        mentioned_users: Vec::new(),
        mentioned_channels: Vec::new(),
        attachments: Vec::new(),
    }
}
