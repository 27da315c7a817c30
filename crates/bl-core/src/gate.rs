use crate::domain::UserId;
use crate::event::Actor;

/// Guild permission bits, matching the Discord flag layout.
///
/// Only the bits the bot actually gates on are named here; the adapter hands
/// us the raw bit set it resolved for the actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const BAN_MEMBERS: Permissions = Permissions(1 << 2);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);
    pub const MANAGE_GUILD: Permissions = Permissions(1 << 5);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 13);

    pub const fn empty() -> Self {
        Permissions(0)
    }

    pub const fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

/// Capability predicate evaluated before an operation may run.
///
/// One gate per registered operation; concrete actor capabilities are
/// adapted into [`Actor`] by the platform adapter at dispatch time.
pub trait Gate: Send + Sync {
    fn allows(&self, actor: &Actor) -> bool;
}

/// Bitmask gate for moderation operations. `ADMINISTRATOR` implies all.
pub struct RequirePermission(pub Permissions);

impl Gate for RequirePermission {
    fn allows(&self, actor: &Actor) -> bool {
        actor.permissions.contains(Permissions::ADMINISTRATOR)
            || actor.permissions.contains(self.0)
    }
}

/// Fixed identifier allow-list for process-lifecycle operations.
pub struct OwnerAllowList(pub Vec<UserId>);

impl Gate for OwnerAllowList {
    fn allows(&self, actor: &Actor) -> bool {
        self.0.contains(&actor.id)
    }
}
