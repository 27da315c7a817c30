use crate::domain::{ChannelId, GuildId, UserId};
use crate::gate::Permissions;

/// The identity invoking a command, with its resolved capability set.
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: UserId,
    pub username: String,
    pub is_bot: bool,
    pub permissions: Permissions,
}

/// The guild a message arrived from, as far as the dispatcher cares.
#[derive(Clone, Copy, Debug)]
pub struct GuildRef {
    pub id: GuildId,
    pub owner_id: UserId,
    /// False while the guild is in a platform-side outage.
    pub available: bool,
}

/// An inbound text event as delivered by the platform adapter.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub content: String,
    pub actor: Actor,
    pub channel_id: ChannelId,
    pub guild: Option<GuildRef>,
    /// Users explicitly mentioned, in message order.
    pub mentioned_users: Vec<UserId>,
    /// Channels explicitly mentioned, in message order.
    pub mentioned_channels: Vec<ChannelId>,
    /// Attachment URLs; the first one doubles as ban evidence.
    pub attachments: Vec<String>,
}

/// What the dispatcher hands back to be sent to the invoking channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    text: Option<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    /// A handler that already answered through the platform directly.
    pub fn silent() -> Self {
        Self { text: None }
    }

    pub fn message(&self) -> Option<&str> {
        self.text.as_deref()
    }
}
