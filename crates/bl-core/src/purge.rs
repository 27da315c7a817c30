use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::domain::{ChannelId, GuildId};
use crate::platform::ChatPlatform;
use crate::settings::SettingsStore;
use crate::{errors::Error, Result};

/// The platform's maximum items returned/deleted per call.
pub const BATCH_CEILING: u16 = 100;

/// Attempts per drain cycle before a platform failure becomes terminal.
const MAX_CYCLE_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeAmount {
    /// Bounded: delete this many recent messages (valid range 1..=99).
    Count(u64),
    /// Unbounded: drain the channel in batch-ceiling cycles.
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuildPurgeMode {
    /// Delete every channel, then recreate one default channel.
    Reindex,
    /// Delete every channel and create nothing.
    DestroyOnly,
}

/// What a completed purge did, mostly for replies and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub cycles: u32,
    pub deleted: usize,
}

/// Rate-limited bulk deletion against channels and guilds.
///
/// Every entry point checks the administrative kill switch before touching
/// the platform. The unbounded drain inserts a fixed cooldown between
/// full-batch cycles so the platform does not throttle us.
pub struct PurgeEngine {
    platform: Arc<dyn ChatPlatform>,
    settings: Arc<SettingsStore>,
    cooldown: Duration,
}

impl PurgeEngine {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        settings: Arc<SettingsStore>,
        cooldown: Duration,
    ) -> Self {
        Self {
            platform,
            settings,
            cooldown,
        }
    }

    /// Fail fast when purge is administratively disabled.
    pub async fn ensure_enabled(&self) -> Result<()> {
        if self.settings.snapshot().await.disable_purge {
            return Err(Error::PurgeDisabled);
        }
        Ok(())
    }

    pub async fn purge_channel(
        &self,
        channel: ChannelId,
        amount: PurgeAmount,
    ) -> Result<PurgeOutcome> {
        self.ensure_enabled().await?;

        match amount {
            PurgeAmount::Count(n) => self.purge_bounded(channel, n).await,
            PurgeAmount::All => self.drain_channel(channel).await,
        }
    }

    /// Bounded mode: one fetch of `n + 1` messages (the invoking command
    /// message included), one bulk delete.
    async fn purge_bounded(&self, channel: ChannelId, n: u64) -> Result<PurgeOutcome> {
        if !(1..=99).contains(&n) {
            return Err(Error::OutOfRange(n));
        }

        let ids = self.platform.fetch_messages(channel, n as u16 + 1).await?;
        if ids.is_empty() {
            return Ok(PurgeOutcome::default());
        }
        self.platform.bulk_delete(channel, &ids).await?;

        Ok(PurgeOutcome {
            cycles: 1,
            deleted: ids.len(),
        })
    }

    /// Unbounded mode: fetch-delete cycles of the maximum batch size.
    ///
    /// A batch of fewer than [`BATCH_CEILING`] messages means the channel is
    /// drained and the loop stops; a full batch schedules another cycle
    /// after the cooldown. Platform failures inside a cycle are retried
    /// after the same cooldown, up to [`MAX_CYCLE_ATTEMPTS`] times.
    async fn drain_channel(&self, channel: ChannelId) -> Result<PurgeOutcome> {
        let mut outcome = PurgeOutcome::default();
        let mut attempts = 0;

        loop {
            let batch = match self.drain_cycle(channel).await {
                Ok(batch) => batch,
                Err(err) if err.is_platform() => {
                    attempts += 1;
                    if attempts >= MAX_CYCLE_ATTEMPTS {
                        return Err(err);
                    }
                    warn!(channel = %channel, attempt = attempts, error = %err, "purge cycle failed, retrying after cooldown");
                    sleep(self.cooldown).await;
                    continue;
                }
                Err(err) => return Err(err),
            };
            attempts = 0;

            if batch == 0 {
                break;
            }
            outcome.cycles += 1;
            outcome.deleted += batch;

            if batch < BATCH_CEILING as usize {
                break;
            }
            sleep(self.cooldown).await;
        }

        info!(channel = %channel, cycles = outcome.cycles, deleted = outcome.deleted, "channel drained");
        Ok(outcome)
    }

    async fn drain_cycle(&self, channel: ChannelId) -> Result<usize> {
        let ids = self.platform.fetch_messages(channel, BATCH_CEILING).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.platform.bulk_delete(channel, &ids).await?;
        Ok(ids.len())
    }

    /// Guild-wide channel deletion. Channels are handled independently;
    /// one failure is logged and does not stop or fail the rest.
    pub async fn purge_guild(&self, guild: GuildId, mode: GuildPurgeMode) -> Result<()> {
        self.ensure_enabled().await?;

        let channels = self.platform.guild_channels(guild).await?;
        for channel in channels {
            if let Err(err) = self.platform.delete_channel(channel).await {
                warn!(guild = %guild, channel = %channel, error = %err, "channel deletion failed");
            }
        }

        if mode == GuildPurgeMode::Reindex {
            let created = self.platform.create_text_channel(guild, "general").await?;
            info!(guild = %guild, channel = %created, "recreated default channel");
        }

        Ok(())
    }

    /// Drain every channel in the guild, each independently.
    pub async fn purge_guild_messages(&self, guild: GuildId) -> Result<()> {
        self.ensure_enabled().await?;

        let channels = self.platform.guild_channels(guild).await?;
        for channel in channels {
            if let Err(err) = self.drain_channel(channel).await {
                warn!(guild = %guild, channel = %channel, error = %err, "channel drain failed");
            }
        }

        Ok(())
    }

    /// Clone a channel's configuration, then delete the original.
    ///
    /// Strictly sequential: if the clone fails, the original is untouched.
    pub async fn remake(&self, channel: ChannelId) -> Result<ChannelId> {
        self.ensure_enabled().await?;

        let clone = self.platform.clone_channel(channel).await?;
        self.platform.delete_channel(channel).await?;
        Ok(clone)
    }
}
