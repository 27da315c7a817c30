//! The gateway event loop: one shard, events adapted into core types and
//! dispatched on their own tasks.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{error, info, warn};
use twilight_gateway::{EventTypeFlags, Intents, Shard, ShardId, StreamExt as _};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::incoming::{GuildCreate, MessageCreate};

use bl_core::dispatcher::CommandDispatcher;
use bl_core::domain::{ChannelId, GuildId, UserId};
use bl_core::event::{Actor, GuildRef, InboundEvent};
use bl_core::gate::Permissions;
use bl_core::platform::ChatPlatform;

use crate::platform::map_body_err;
use crate::DiscordPlatform;

/// Run the gateway loop until the platform's cancellation token fires or
/// the event stream ends.
pub async fn run(
    token: String,
    platform: Arc<DiscordPlatform>,
    dispatcher: Arc<CommandDispatcher>,
) -> anyhow::Result<()> {
    let intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT;
    let mut shard = Shard::new(ShardId::new(0, 1), token, intents);
    let cancel = platform.cancel_token();

    info!("connecting to the gateway");
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = shard.next_event(EventTypeFlags::all()) => item,
        };
        let Some(item) = item else { break };
        let event = match item {
            Ok(event) => event,
            Err(source) => {
                error!(?source, "gateway event stream error");
                continue;
            }
        };

        if let Some(latency) = shard.latency().average() {
            platform.note_latency(latency.as_millis() as u64);
        }

        match event {
            Event::Ready(ready) => {
                platform.note_ready();
                info!(user = %ready.user.name, "gateway ready");
            }
            Event::GuildCreate(guild) => {
                if let GuildCreate::Available(guild) = *guild {
                    platform.remember_owner(
                        GuildId(guild.id.get()),
                        UserId(guild.owner_id.get()),
                    );
                }
            }
            Event::MessageCreate(msg) => {
                let platform = Arc::clone(&platform);
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    handle_message(platform, dispatcher, *msg).await;
                });
            }
            _ => {}
        }
    }

    info!("gateway loop stopped");
    Ok(())
}

async fn handle_message(
    platform: Arc<DiscordPlatform>,
    dispatcher: Arc<CommandDispatcher>,
    msg: MessageCreate,
) {
    platform.remember_user(&msg.author.name, UserId(msg.author.id.get()));
    for mention in &msg.mentions {
        platform.remember_user(&mention.name, UserId(mention.id.get()));
    }

    let inbound = match to_inbound(&platform, &msg).await {
        Ok(inbound) => inbound,
        Err(err) => {
            warn!(error = %err, "could not adapt inbound message");
            return;
        }
    };

    let channel = inbound.channel_id;
    if let Some(reply) = dispatcher.dispatch(inbound).await {
        if let Some(text) = reply.message() {
            if let Err(err) = platform.send_message(channel, text).await {
                warn!(channel = %channel, error = %err, "reply delivery failed");
            }
        }
    }
}

async fn to_inbound(
    platform: &DiscordPlatform,
    msg: &MessageCreate,
) -> bl_core::Result<InboundEvent> {
    let guild = match msg.guild_id {
        Some(id) => {
            let guild = GuildId(id.get());
            // A message only arrives from an available guild.
            Some(GuildRef {
                id: guild,
                owner_id: platform.guild_owner(guild).await?,
                available: true,
            })
        }
        None => None,
    };

    Ok(InboundEvent {
        content: msg.content.clone(),
        actor: Actor {
            id: UserId(msg.author.id.get()),
            username: msg.author.name.clone(),
            is_bot: msg.author.bot,
            permissions: resolve_permissions(platform, msg).await?,
        },
        channel_id: ChannelId(msg.channel_id.get()),
        guild,
        mentioned_users: msg.mentions.iter().map(|m| UserId(m.id.get())).collect(),
        mentioned_channels: channel_mentions(&msg.content),
        attachments: msg.attachments.iter().map(|a| a.url.clone()).collect(),
    })
}

/// The author's effective guild permissions: the gateway-provided set when
/// present, otherwise the union of their role permissions (including
/// @everyone).
async fn resolve_permissions(
    platform: &DiscordPlatform,
    msg: &MessageCreate,
) -> bl_core::Result<Permissions> {
    if let Some(perms) = msg.member.as_ref().and_then(|m| m.permissions) {
        return Ok(Permissions(perms.bits()));
    }

    let Some(guild_id) = msg.guild_id else {
        return Ok(Permissions::empty());
    };

    let member = platform
        .http()
        .guild_member(guild_id, msg.author.id)
        .await
        .map_err(|e| platform.api_err(e))?
        .model()
        .await
        .map_err(map_body_err)?;
    let roles = platform
        .http()
        .roles(guild_id)
        .await
        .map_err(|e| platform.api_err(e))?
        .model()
        .await
        .map_err(map_body_err)?;

    let mut resolved = twilight_model::guild::Permissions::empty();
    for role in roles {
        if role.id == guild_id.cast() || member.roles.contains(&role.id) {
            resolved |= role.permissions;
        }
    }

    Ok(Permissions(resolved.bits()))
}

fn channel_mentions(content: &str) -> Vec<ChannelId> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"<#(\d+)>").expect("valid regex"));

    re.captures_iter(content)
        .filter_map(|c| c[1].parse().ok())
        .map(ChannelId)
        .collect()
}
