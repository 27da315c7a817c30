//! The `setlog` and `setnotifyrep` configuration commands. Both mutate the
//! in-memory settings; persistence happens at shutdown.

use crate::dispatcher::{OpContext, Operation};
use crate::domain::ChannelId;
use crate::event::{InboundEvent, Reply};
use crate::gate::{Gate, Permissions, RequirePermission};
use crate::{errors::Error, Result};

pub struct SetLog {
    gate: RequirePermission,
}

impl SetLog {
    pub fn new() -> Self {
        Self {
            gate: RequirePermission(Permissions::MANAGE_GUILD),
        }
    }
}

/// Accepts `<#123>` mention syntax or a bare numeric id.
fn parse_channel_token(token: &str) -> Option<ChannelId> {
    let raw = token
        .strip_prefix("<#")
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token);
    raw.parse().ok().map(ChannelId)
}

#[async_trait::async_trait]
impl Operation for SetLog {
    fn name(&self) -> &'static str {
        "setlog"
    }

    fn usage(&self) -> &'static str {
        "setlog <#channel>"
    }

    fn gate(&self) -> &dyn Gate {
        &self.gate
    }

    async fn run(&self, ctx: &OpContext, event: &InboundEvent, args: &[String]) -> Result<Reply> {
        let channel = event
            .mentioned_channels
            .first()
            .copied()
            .or_else(|| args.first().and_then(|a| parse_channel_token(a)));
        let Some(channel) = channel else {
            return Err(Error::Usage(self.usage().to_string()));
        };

        ctx.settings.update(|s| s.log_channel = Some(channel)).await;
        Ok(Reply::text(format!(
            ":white_check_mark: Log channel is now <#{channel}>."
        )))
    }
}

pub struct SetNotifyRep {
    gate: RequirePermission,
}

impl SetNotifyRep {
    pub fn new() -> Self {
        Self {
            gate: RequirePermission(Permissions::MANAGE_GUILD),
        }
    }
}

#[async_trait::async_trait]
impl Operation for SetNotifyRep {
    fn name(&self) -> &'static str {
        "setnotifyrep"
    }

    fn usage(&self) -> &'static str {
        "setnotifyrep <0-10>"
    }

    fn gate(&self) -> &dyn Gate {
        &self.gate
    }

    async fn run(&self, ctx: &OpContext, _event: &InboundEvent, args: &[String]) -> Result<Reply> {
        let threshold: u32 = args
            .first()
            .and_then(|a| a.parse().ok())
            .filter(|n| *n <= 10)
            .ok_or_else(|| Error::Usage(self.usage().to_string()))?;

        ctx.settings.update(|s| s.notify_rep = threshold).await;
        let reply = if threshold == 0 {
            ":white_check_mark: Reputation notifications are off.".to_string()
        } else {
            format!(":white_check_mark: Notifying at reputation {threshold}.")
        };
        Ok(Reply::text(reply))
    }
}
