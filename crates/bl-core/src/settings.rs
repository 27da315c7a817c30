use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::ChannelId;
use crate::Result;

/// Persisted, mutable bot settings.
///
/// Read at dispatch time, mutated by the `set*` commands, and flushed to
/// disk on every shutdown path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Command prefix stripped from inbound text.
    pub prefix: String,
    /// Administrative kill switch for every purge entry point.
    pub disable_purge: bool,
    /// Channel receiving moderation notifications, if configured.
    pub log_channel: Option<ChannelId>,
    /// Reputation threshold that triggers a log-channel notification on ban.
    /// Zero disables the notification.
    pub notify_rep: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prefix: "bl!".to_string(),
            disable_purge: false,
            log_channel: None,
            notify_rep: 0,
        }
    }
}

/// File-backed settings store. Mutations are in-memory until [`store`] runs;
/// the supervisor flushes on shutdown.
///
/// [`store`]: SettingsStore::store
pub struct SettingsStore {
    path: PathBuf,
    state: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file is
    /// missing. A malformed file is an error, not silently reset.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub async fn snapshot(&self) -> Settings {
        self.state.read().await.clone()
    }

    pub async fn prefix(&self) -> String {
        self.state.read().await.prefix.clone()
    }

    pub async fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut state = self.state.write().await;
        mutate(&mut state);
    }

    /// Flush the current settings to disk.
    pub async fn store(&self) -> Result<()> {
        let snapshot = self.state.read().await.clone();
        let body = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}
