use tracing::{error, info, warn};

use crate::dispatcher::{OpContext, Operation};
use crate::domain::{GuildId, UserId};
use crate::event::{InboundEvent, Reply};
use crate::gate::{Gate, Permissions, RequirePermission};
use crate::ledger::BanRequest;
use crate::platform::ChatPlatform;
use crate::{errors::Error, Result};

/// `ban <mention|id|name> <reason> [--force]`
///
/// Records the ban in the ledger first, then enforces it on the platform
/// when the target is currently a member. The ledger entry stands even if
/// the platform rejects the enforcement call.
pub struct Ban {
    gate: RequirePermission,
}

impl Ban {
    pub fn new() -> Self {
        Self {
            gate: RequirePermission(Permissions::ADMINISTRATOR),
        }
    }

    async fn notify_threshold(&self, ctx: &OpContext, target: UserId, rep: u32) {
        let settings = ctx.settings.snapshot().await;
        if settings.notify_rep == 0 || rep < settings.notify_rep {
            return;
        }
        let Some(log_channel) = settings.log_channel else {
            return;
        };
        let text = format!(":warning: `{target}` has reached reputation {rep}.");
        if let Err(err) = ctx.platform.send_message(log_channel, &text).await {
            warn!(user = %target, error = %err, "reputation notification failed");
        }
    }
}

#[async_trait::async_trait]
impl Operation for Ban {
    fn name(&self) -> &'static str {
        "ban"
    }

    fn usage(&self) -> &'static str {
        "ban <mention|id|name> <reason> [--force]"
    }

    fn gate(&self) -> &dyn Gate {
        &self.gate
    }

    async fn run(&self, ctx: &OpContext, event: &InboundEvent, args: &[String]) -> Result<Reply> {
        let Some(guild) = event.guild.filter(|g| g.available) else {
            return Ok(Reply::text(":x: This command only works inside a server."));
        };
        let Some(target_token) = args.first() else {
            return Err(Error::Usage(self.usage().to_string()));
        };
        let Some(reason) = args.get(1) else {
            return Err(Error::Usage(self.usage().to_string()));
        };
        let force = args.iter().skip(2).any(|a| a == "--force");

        // Evidence is mandatory in every mode; refuse before resolution so
        // a typo'd target without evidence still gets the right reply.
        let Some(evidence) = event.attachments.first() else {
            return Err(Error::MissingEvidence);
        };

        let resolved =
            resolve_target(ctx.platform.as_ref(), guild.id, event, target_token).await?;
        let target = match resolved {
            Some(id) => id,
            // Forced bans accept a bare numeric identifier the platform has
            // never seen (e.g. a user who deleted their account).
            None if force => UserId(
                bare_token(target_token)
                    .parse()
                    .map_err(|_| Error::UnresolvedUser(target_token.clone()))?,
            ),
            None => return Err(Error::UnresolvedUser(target_token.clone())),
        };

        let outcome = ctx
            .ledger
            .apply_ban(BanRequest {
                actor_id: event.actor.id,
                target_id: target,
                guild_id: guild.id,
                owner_id: guild.owner_id,
                reason,
                evidence,
                force,
            })
            .await?;
        info!(user = %target, guild = %guild.id, rep = outcome.rep, "ban recorded");

        self.notify_threshold(ctx, target, outcome.rep).await;

        // Enforcement only applies to current members. The ledger entry is
        // already committed either way.
        if matches!(ctx.platform.is_member(guild.id, target).await, Ok(true)) {
            if let Err(err) = ctx.platform.ban_user(guild.id, target, reason).await {
                error!(user = %target, guild = %guild.id, error = %err, "platform ban failed");
            }
        }

        Ok(Reply::text(format!(":hammer: Banned `{target}`.")))
    }
}

/// Strip the `<@...>` / `<@!...>` mention wrapping, if present.
fn bare_token(token: &str) -> &str {
    token
        .strip_prefix("<@")
        .map(|t| t.strip_prefix('!').unwrap_or(t))
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token)
}

/// Platform user identifiers are 17 to 19 decimal digits.
fn looks_like_snowflake(s: &str) -> bool {
    (17..=19).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

/// Resolve a target token to a user id, cheapest source first: the message's
/// own mentions, then the guild ban list, then a direct id lookup, then an
/// exact username search with a final numeric-identifier fallback.
async fn resolve_target(
    platform: &dyn ChatPlatform,
    guild: GuildId,
    event: &InboundEvent,
    token: &str,
) -> Result<Option<UserId>> {
    if let Some(&mentioned) = event.mentioned_users.first() {
        return Ok(Some(mentioned));
    }

    let raw = bare_token(token);
    if looks_like_snowflake(raw) {
        let id = UserId(raw.parse().map_err(|_| Error::UnresolvedUser(token.to_string()))?);
        if platform.guild_bans(guild).await?.contains(&id) {
            return Ok(Some(id));
        }
        return platform.user_by_id(id).await;
    }

    if let Some(found) = platform.find_user_by_name(token).await? {
        return Ok(Some(found));
    }

    // Numeric tokens that are not snowflake-shaped still name a user the
    // platform may know directly.
    match raw.parse::<u64>() {
        Ok(n) => platform.user_by_id(UserId(n)).await,
        Err(_) => Ok(None),
    }
}
