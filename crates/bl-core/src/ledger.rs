use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::domain::{GuildId, UserId};
use crate::{errors::Error, Result};

/// Per-user ban history. One record per platform user ever sanctioned.
///
/// `probes` and `reasons` are index-aligned: entry `i` of one explains
/// entry `i` of the other. `rep` only ever goes up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub banned_from_server_owner: BTreeSet<UserId>,
    pub banned_from_server: BTreeSet<GuildId>,
    pub banned_from_user: BTreeSet<UserId>,
    pub probes: Vec<String>,
    pub reasons: Vec<String>,
    pub rep: u32,
}

/// Everything a single ban application needs, gathered by the command layer
/// before the ledger's critical section is entered.
#[derive(Clone, Copy, Debug)]
pub struct BanRequest<'a> {
    pub actor_id: UserId,
    pub target_id: UserId,
    pub guild_id: GuildId,
    pub owner_id: UserId,
    pub reason: &'a str,
    pub evidence: &'a str,
    /// Bypass the duplicate check (used for raw-identifier bans of
    /// non-members).
    pub force: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BanOutcome {
    /// The target's reputation counter after this ban.
    pub rep: u32,
}

#[derive(Debug, Default)]
struct LedgerInner {
    users: HashMap<UserId, UserRecord>,
    ban_set: BTreeSet<UserId>,
}

/// The ban ledger. All mutation goes through [`apply_ban`] under one lock,
/// so two concurrent bans against the same target cannot interleave their
/// read-modify-append sequence.
///
/// [`apply_ban`]: ModerationLedger::apply_ban
#[derive(Debug, Default)]
pub struct ModerationLedger {
    inner: Mutex<LedgerInner>,
}

impl ModerationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one ban to the ledger.
    ///
    /// Unless `force` is set, the ban is rejected with
    /// [`Error::AlreadyBanned`] when the (owner, guild, moderator) triple is
    /// already simultaneously recorded for the target. Evidence is required
    /// in every mode; rejection happens before any mutation.
    pub async fn apply_ban(&self, req: BanRequest<'_>) -> Result<BanOutcome> {
        if req.evidence.trim().is_empty() {
            return Err(Error::MissingEvidence);
        }

        let mut inner = self.inner.lock().await;

        let rep = {
            let record = inner.users.entry(req.target_id).or_default();

            if !req.force
                && record.banned_from_server_owner.contains(&req.owner_id)
                && record.banned_from_server.contains(&req.guild_id)
                && record.banned_from_user.contains(&req.actor_id)
            {
                return Err(Error::AlreadyBanned);
            }

            record.banned_from_server_owner.insert(req.owner_id);
            record.banned_from_server.insert(req.guild_id);
            record.banned_from_user.insert(req.actor_id);
            record.probes.push(req.evidence.to_string());
            record.reasons.push(req.reason.to_string());
            record.rep += 1;
            record.rep
        };

        inner.ban_set.insert(req.target_id);

        Ok(BanOutcome { rep })
    }

    pub async fn record(&self, user: UserId) -> Option<UserRecord> {
        self.inner.lock().await.users.get(&user).cloned()
    }

    pub async fn is_banned(&self, user: UserId) -> bool {
        self.inner.lock().await.ban_set.contains(&user)
    }

    pub async fn ban_set(&self) -> BTreeSet<UserId> {
        self.inner.lock().await.ban_set.clone()
    }
}
