/// Core error type for the bot.
///
/// The adapter crate maps platform SDK failures into [`Error::Platform`] so
/// the core can classify them uniformly (retryable for purge, swallowed by
/// the supervisor's async-fault path, terminal-but-committed for bans).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Bad or missing command arguments. Surfaced as a reply, never retried.
    #[error("usage: {0}")]
    Usage(String),

    /// A purge count outside the accepted [1, 99] window.
    #[error("count out of range: {0} (expected 1-99)")]
    OutOfRange(u64),

    /// Ban target could not be resolved to a platform user.
    #[error("could not resolve user: {0}")]
    UnresolvedUser(String),

    /// The idempotence triple already holds for this target.
    #[error("user is already banned by this moderator in this guild")]
    AlreadyBanned,

    /// Ban invoked without an attached evidence reference.
    #[error("an evidence attachment is required to ban")]
    MissingEvidence,

    /// Purge is administratively disabled in the current settings.
    #[error("purge is disabled")]
    PurgeDisabled,

    /// Failure reported by the external chat platform.
    #[error("platform error: {0}")]
    Platform(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to the external platform's own taxonomy.
    ///
    /// The supervisor swallows these when they surface as unhandled async
    /// faults (e.g. a missing-permission rejection reported by the API).
    pub fn is_platform(&self) -> bool {
        matches!(self, Error::Platform(_))
    }

    /// The user-visible reply for an operation-level error, if any.
    ///
    /// `None` means the error is unexpected at the command boundary and the
    /// dispatcher should log it and answer with a generic failure reply.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Error::Usage(msg) => Some(format!(":x: {msg}")),
            Error::OutOfRange(n) => Some(format!(
                ":x: {n} is out of range, give me a number between 1 and 99."
            )),
            Error::UnresolvedUser(raw) => Some(format!(":x: I don't know any user `{raw}`.")),
            Error::AlreadyBanned => {
                Some(":x: You already banned that user from this server.".to_string())
            }
            Error::MissingEvidence => {
                Some(":x: Attach an evidence screenshot or link to ban someone.".to_string())
            }
            Error::PurgeDisabled => Some(":x: Purge is disabled on this server.".to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
