use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::domain::{ChannelId, UserId};
use crate::{errors::Error, Result};

/// Immutable process configuration, read once at startup.
///
/// Mutable, persisted settings (prefix, purge switch, ...) live in
/// [`crate::settings::SettingsStore`] instead.
#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    /// Users allowed to run process-lifecycle commands (`shutdown`).
    pub owners: Vec<UserId>,

    /// JSON file backing the persisted settings store.
    pub settings_file: PathBuf,
    /// Lock/pid marker; its absence signals "not running" to the outside.
    pub pid_file: PathBuf,
    /// Channel mirrored with crash/error reports, if any.
    pub report_channel: Option<ChannelId>,

    /// Cooldown between successive bulk-deletion cycles.
    pub purge_cooldown: Duration,
    /// Total budget of the interrupt-signal countdown.
    pub interrupt_countdown: Duration,

    /// Commit id baked in by the build/deploy tooling, if provided.
    pub commit: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let discord_token = env_str("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN environment variable is required".to_string(),
            ));
        }

        let owners = parse_csv_u64(env_str("BOT_OWNERS"))
            .into_iter()
            .map(UserId)
            .collect::<Vec<_>>();
        if owners.is_empty() {
            return Err(Error::Config(
                "BOT_OWNERS environment variable is required".to_string(),
            ));
        }

        let settings_file =
            PathBuf::from(env_str("SETTINGS_FILE").unwrap_or("./settings.json".to_string()));
        let pid_file =
            PathBuf::from(env_str("PID_FILE").unwrap_or("./blacklistener.pid".to_string()));
        let report_channel = env_u64("REPORT_CHANNEL").map(ChannelId);

        let purge_cooldown = Duration::from_millis(env_u64("PURGE_COOLDOWN_MS").unwrap_or(3000));
        let interrupt_countdown =
            Duration::from_millis(env_u64("INTERRUPT_COUNTDOWN_MS").unwrap_or(5000));

        let commit = env_str("BL_COMMIT").and_then(non_empty);

        Ok(Self {
            discord_token,
            owners,
            settings_file,
            pid_file,
            report_channel,
            purge_cooldown,
            interrupt_countdown,
            commit,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        // The real environment always wins over the file.
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        env::set_var(key, strip_quotes(value.trim()));
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| {
            value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
        })
        .unwrap_or(value)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_u64(v: Option<String>) -> Vec<u64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_owner_parsing_skips_junk() {
        let parsed = parse_csv_u64(Some(" 42, , abc,7 ".to_string()));
        assert_eq!(parsed, vec![42, 7]);
    }

    #[test]
    fn quote_stripping_handles_both_styles_and_leaves_bare_values() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("abc"), "abc");
        // A lone or mismatched quote is kept as-is.
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes("\"abc'"), "\"abc'");
    }

    #[test]
    fn dotenv_does_not_override_existing_env() {
        let pid = std::process::id();
        let path = PathBuf::from(format!("/tmp/bl-dotenv-{pid}"));
        let key = format!("BL_TEST_DOTENV_{pid}");
        fs::write(&path, format!("{key}=\"from-file\"\n# comment\n")).unwrap();

        env::set_var(&key, "from-env");
        load_dotenv_if_present(&path);
        assert_eq!(env::var(&key).unwrap(), "from-env");

        env::remove_var(&key);
        load_dotenv_if_present(&path);
        assert_eq!(env::var(&key).unwrap(), "from-file");

        env::remove_var(&key);
        let _ = fs::remove_file(&path);
    }
}
