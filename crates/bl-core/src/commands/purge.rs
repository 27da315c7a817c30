use std::future::Future;

use tracing::info;

use crate::dispatcher::{OpContext, Operation};
use crate::event::{InboundEvent, Reply};
use crate::gate::{Gate, Permissions, RequirePermission};
use crate::purge::{GuildPurgeMode, PurgeAmount};
use crate::{errors::Error, Result};

/// `purge [n|all|gdel|gdel-msg|gdel-really|remake <#channel>]`
///
/// Bounded counts run inline and answer with the deletion tally. The
/// unbounded modes can take minutes on a large guild, so they detach into
/// their own task and the reply is an acknowledgement; failures inside a
/// detached run go through the supervisor's async-fault path.
pub struct Purge {
    gate: RequirePermission,
}

impl Purge {
    pub fn new() -> Self {
        Self {
            gate: RequirePermission(Permissions::ADMINISTRATOR),
        }
    }
}

fn detach<F>(ctx: &OpContext, what: &'static str, fut: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let supervisor = ctx.supervisor.clone();
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => info!(task = what, "detached purge finished"),
            Err(err) => supervisor.on_async_fault(&err).await,
        }
    });
}

#[async_trait::async_trait]
impl Operation for Purge {
    fn name(&self) -> &'static str {
        "purge"
    }

    fn usage(&self) -> &'static str {
        "purge [1-99|all|gdel|gdel-msg|gdel-really|remake <#channel>]"
    }

    fn gate(&self) -> &dyn Gate {
        &self.gate
    }

    async fn run(&self, ctx: &OpContext, event: &InboundEvent, args: &[String]) -> Result<Reply> {
        let channel = event.channel_id;

        match args.first().map(String::as_str) {
            None | Some("all") => {
                ctx.purge.ensure_enabled().await?;
                let engine = ctx.purge.clone();
                detach(ctx, "purge all", async move {
                    engine.purge_channel(channel, PurgeAmount::All).await.map(|_| ())
                });
                Ok(Reply::text(":broom: Purging this channel."))
            }
            Some("gdel") | Some("gdel-really") | Some("gdel-msg") => {
                let Some(guild) = event.guild.filter(|g| g.available) else {
                    return Ok(Reply::text(":x: This command only works inside a server."));
                };
                ctx.purge.ensure_enabled().await?;

                let engine = ctx.purge.clone();
                match args[0].as_str() {
                    "gdel" => detach(ctx, "purge gdel", async move {
                        engine.purge_guild(guild.id, GuildPurgeMode::Reindex).await
                    }),
                    "gdel-really" => detach(ctx, "purge gdel-really", async move {
                        engine.purge_guild(guild.id, GuildPurgeMode::DestroyOnly).await
                    }),
                    _ => detach(ctx, "purge gdel-msg", async move {
                        engine.purge_guild_messages(guild.id).await
                    }),
                }
                Ok(Reply::text(":broom: Purging this server."))
            }
            Some("remake") => {
                let Some(&target) = event.mentioned_channels.first() else {
                    return Err(Error::Usage("purge remake <#channel>".to_string()));
                };
                let clone = ctx.purge.remake(target).await?;
                info!(original = %target, clone = %clone, "channel remade");
                Ok(Reply::text(":ok_hand:"))
            }
            Some(raw) => {
                let n: u64 = raw
                    .parse()
                    .map_err(|_| Error::Usage(self.usage().to_string()))?;
                let outcome = ctx.purge.purge_channel(channel, PurgeAmount::Count(n)).await?;
                Ok(Reply::text(format!(
                    ":broom: Purged {} message(s).",
                    outcome.deleted
                )))
            }
        }
    }
}
