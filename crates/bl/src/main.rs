use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use twilight_http::Client;

use bl_core::commands;
use bl_core::config::Config;
use bl_core::dispatcher::{CommandDispatcher, OpContext};
use bl_core::ledger::ModerationLedger;
use bl_core::purge::PurgeEngine;
use bl_core::settings::SettingsStore;
use bl_core::supervisor::{
    self, ProcessSupervisor, SupervisorOptions, SystemProcessControl,
};
use bl_discord::DiscordPlatform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bl_core::logging::init("bl");

    let cfg = Config::load()?;
    info!(owners = cfg.owners.len(), "BlackListener starting");

    let settings = Arc::new(SettingsStore::load(cfg.settings_file.clone())?);
    let http = Arc::new(Client::new(cfg.discord_token.clone()));
    let platform = Arc::new(DiscordPlatform::new(http));

    let ledger = Arc::new(ModerationLedger::new());
    let purge = Arc::new(PurgeEngine::new(
        platform.clone(),
        settings.clone(),
        cfg.purge_cooldown,
    ));
    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::new(SystemProcessControl),
        settings.clone(),
        SupervisorOptions {
            pid_file: cfg.pid_file.clone(),
            report_base: std::path::PathBuf::from("."),
            report_channel: cfg.report_channel,
            commit: cfg.commit.clone(),
            countdown: cfg.interrupt_countdown,
        },
    ));
    supervisor.set_platform(platform.clone());
    platform.set_supervisor(supervisor.clone());
    supervisor.write_pid_marker()?;
    supervisor::install_panic_hook(supervisor.clone());

    let ctx = OpContext {
        platform: platform.clone(),
        ledger,
        purge,
        settings,
        supervisor: supervisor.clone(),
    };
    let dispatcher = Arc::new(CommandDispatcher::new(
        commands::registry(cfg.owners.clone()),
        ctx,
    ));

    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    warn!("interrupt signal listener failed");
                    break;
                }
                supervisor.on_interrupt().await;
            }
        });
    }

    // The process manager probes liveness over stdin.
    tokio::spawn(async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(reply) = supervisor::heartbeat_reply(&line) {
                println!("{reply}");
            }
        }
    });

    if let Err(err) = bl_discord::gateway::run(cfg.discord_token, platform, dispatcher).await {
        error!(error = %err, "gateway failed");
        supervisor.crash(&format!("gateway failed: {err}\n\n{err:?}")).await;
    }

    // The gateway loop also returns when a shutdown path cancelled it; the
    // supervisor ignores this if the exit already happened.
    supervisor.shutdown(false).await;
    Ok(())
}
