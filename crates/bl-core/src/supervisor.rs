use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::ChannelId;
use crate::platform::{ChatPlatform, ConnectionStats};
use crate::report::{self, Report, ReportInput, ReportKind};
use crate::settings::SettingsStore;
use crate::{errors::Error, Result};

pub const EXIT_OK: i32 = 0;
pub const EXIT_CRASH: i32 = 1;
/// Crash path where even the report write failed.
pub const EXIT_REPORT_WRITE_FAILED: i32 = 2;

/// Process-wide lifecycle state. Owned exclusively by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    ShuttingDownGraceful,
    CountdownToForcedExit,
    Crashed,
    Terminated,
}

/// Port for the one thing the supervisor cannot take back: process exit.
/// The real implementation terminates; tests record the code instead.
pub trait ProcessControl: Send + Sync {
    fn exit(&self, code: i32);
}

pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

#[derive(Clone, Debug)]
pub struct SupervisorOptions {
    /// Lock/pid marker removed on every shutdown path.
    pub pid_file: PathBuf,
    /// Directory under which `{error,crash}-reports/` live.
    pub report_base: PathBuf,
    /// Channel mirrored with report bodies, best-effort.
    pub report_channel: Option<ChannelId>,
    pub commit: Option<String>,
    /// Total budget of the interrupt countdown.
    pub countdown: Duration,
}

/// Converts asynchronous failures, fatal faults, and shutdown signals into
/// one deterministic state machine.
///
/// All state writes happen under a single mutex, and the terminal exit
/// action is guarded by an atomic flag so racing paths (crash vs signal vs
/// command) can never produce two competing exit sequences.
pub struct ProcessSupervisor {
    state: Mutex<SupervisorState>,
    control: Arc<dyn ProcessControl>,
    settings: Arc<SettingsStore>,
    platform: OnceLock<Arc<dyn ChatPlatform>>,
    opts: SupervisorOptions,
    countdown_deadline: Mutex<Option<Instant>>,
    last_task: Mutex<String>,
    exited: AtomicBool,
}

impl ProcessSupervisor {
    pub fn new(
        control: Arc<dyn ProcessControl>,
        settings: Arc<SettingsStore>,
        opts: SupervisorOptions,
    ) -> Self {
        Self {
            state: Mutex::new(SupervisorState::Running),
            control,
            settings,
            platform: OnceLock::new(),
            opts,
            countdown_deadline: Mutex::new(None),
            last_task: Mutex::new("startup".to_string()),
            exited: AtomicBool::new(false),
        }
    }

    /// Wire the platform in after construction (the adapter needs the
    /// supervisor and vice versa).
    pub fn set_platform(&self, platform: Arc<dyn ChatPlatform>) {
        let _ = self.platform.set(platform);
    }

    pub fn state(&self) -> SupervisorState {
        *lock_unpoisoned(&self.state)
    }

    /// Record the operation currently being dispatched; reports include it
    /// as the last-known task label.
    pub fn note_task(&self, name: &str) {
        *lock_unpoisoned(&self.last_task) = name.to_string();
    }

    pub fn write_pid_marker(&self) -> Result<()> {
        std::fs::write(&self.opts.pid_file, std::process::id().to_string())?;
        Ok(())
    }

    fn remove_pid_marker(&self) {
        if let Err(err) = std::fs::remove_file(&self.opts.pid_file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove pid marker: {err}");
            }
        }
    }

    /// `Running -> ShuttingDownGraceful -> Terminated`, or the forced
    /// variant that skips client teardown. Both flush settings and remove
    /// the pid marker before exiting with success.
    pub async fn shutdown(&self, forced: bool) {
        {
            let mut state = lock_unpoisoned(&self.state);
            if *state != SupervisorState::Running {
                return;
            }
            *state = if forced {
                SupervisorState::Terminated
            } else {
                SupervisorState::ShuttingDownGraceful
            };
        }

        if forced {
            info!("forced shutdown requested, skipping graceful teardown");
        } else {
            info!("shutting down gracefully");
            if let Some(platform) = self.platform.get() {
                if let Err(err) = platform.disconnect().await {
                    warn!("client teardown failed: {err}");
                }
            }
        }

        if let Err(err) = self.settings.store().await {
            error!("failed to persist settings on shutdown: {err}");
        }
        self.finish_exit(EXIT_OK);
    }

    /// Abrupt termination for the reboot command: pid marker removed so the
    /// external supervisor restarts us, settings deliberately not flushed.
    pub async fn reboot(&self) {
        {
            let mut state = lock_unpoisoned(&self.state);
            if *state != SupervisorState::Running {
                return;
            }
            *state = SupervisorState::Terminated;
        }
        info!("rebooting");
        self.finish_exit(EXIT_OK);
    }

    /// First interrupt signal: start the countdown and a graceful
    /// disconnect. A second interrupt is informational only and does not
    /// shorten the countdown. The countdown elapsing exits unconditionally.
    pub async fn on_interrupt(self: &Arc<Self>) {
        let already_counting = {
            let mut state = lock_unpoisoned(&self.state);
            match *state {
                SupervisorState::Running => {
                    *state = SupervisorState::CountdownToForcedExit;
                    *lock_unpoisoned(&self.countdown_deadline) =
                        Some(Instant::now() + self.opts.countdown);
                    None
                }
                SupervisorState::CountdownToForcedExit => {
                    Some(lock_unpoisoned(&self.countdown_deadline).unwrap_or_else(Instant::now))
                }
                _ => return,
            }
        };

        if let Some(deadline) = already_counting {
            let left = deadline.saturating_duration_since(Instant::now());
            info!(
                "interrupt already caught; exiting in {:.1} s or on disconnect",
                left.as_secs_f64()
            );
            return;
        }

        info!("caught interrupt signal, disconnecting");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(platform) = this.platform.get() {
                if let Err(err) = platform.disconnect().await {
                    warn!("disconnect failed during interrupt handling: {err}");
                }
            }
            if let Err(err) = this.settings.store().await {
                error!("failed to persist settings on interrupt: {err}");
            }
            this.finish_exit(EXIT_OK);
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.opts.countdown).await;
            info!("interrupt countdown elapsed, exiting");
            this.finish_exit(EXIT_OK);
        });
    }

    /// Unhandled asynchronous failure. Platform-taxonomy errors are
    /// swallowed; everything else produces an error report while the
    /// process stays `Running`.
    pub async fn on_async_fault(&self, err: &Error) {
        if err.is_platform() {
            debug!("ignoring platform-side failure: {err}");
            return;
        }

        error!("unhandled failure: {err}");
        let detail = format!("{err}\n\n{err:?}");
        let report = self.build_report(ReportKind::Error, &detail);
        match report::write_blocking(&report) {
            Ok(()) => info!("error report written to {}", report.path.display()),
            Err(io) => error!("could not write error report: {io}"),
        }
        self.mirror_report(&report).await;
    }

    /// Unrecoverable fault reached from async context (e.g. a fatal startup
    /// error): report, best-effort notification, terminal exit.
    pub async fn crash(&self, detail: &str) {
        let (code, report) = self.crash_blocking(detail);
        self.mirror_report(&report).await;
        self.finish_exit(code);
    }

    /// The synchronous part of the crash path, callable from a panic hook.
    ///
    /// The report write is plain blocking I/O and happens unconditionally;
    /// only the notification step is skipped here.
    pub fn crash_blocking(&self, detail: &str) -> (i32, Report) {
        *lock_unpoisoned(&self.state) = SupervisorState::Crashed;
        error!("oh, BlackListener has crashed!");

        let report = self.build_report(ReportKind::Crash, detail);
        let code = match report::write_blocking(&report) {
            Ok(()) => {
                error!("crash report written to {}", report.path.display());
                EXIT_CRASH
            }
            Err(io) => {
                error!("could not write crash report: {io}");
                EXIT_REPORT_WRITE_FAILED
            }
        };
        (code, report)
    }

    /// Rate-limit notices from the platform are observational only.
    pub fn on_rate_limit(&self, context: &str) {
        error!("got rate limited by the platform: {context}");
    }

    fn build_report(&self, kind: ReportKind, detail: &str) -> Report {
        let stats = self
            .platform
            .get()
            .map(|p| p.connection_stats())
            .unwrap_or(ConnectionStats::default());
        let last_task = lock_unpoisoned(&self.last_task).clone();

        report::build(
            &self.opts.report_base,
            ReportInput {
                kind,
                detail,
                last_task: &last_task,
                commit: self.opts.commit.as_deref(),
                stats,
            },
        )
    }

    async fn mirror_report(&self, report: &Report) {
        let (Some(channel), Some(platform)) = (self.opts.report_channel, self.platform.get())
        else {
            return;
        };
        let body = format!("```{}```", report.body);
        match platform.send_message(channel, &body).await {
            Ok(_) => info!("report mirrored to the log channel"),
            Err(err) => warn!("could not mirror report: {err}"),
        }
    }

    /// The single terminal action. Whichever path gets here first wins;
    /// everyone else is a no-op.
    pub fn finish_exit(&self, code: i32) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }
        *lock_unpoisoned(&self.state) = SupervisorState::Terminated;
        self.remove_pid_marker();
        self.control.exit(code);
    }
}

tokio::task_local! {
    static CONTAINED_SCOPE: bool;
}

/// Run a future inside a contained failure scope: panics below it are the
/// dispatcher boundary's problem, not an unrecoverable fault.
pub async fn contained<F>(fut: F) -> F::Output
where
    F: std::future::Future,
{
    CONTAINED_SCOPE.scope(true, fut).await
}

fn in_contained_scope() -> bool {
    CONTAINED_SCOPE.try_with(|v| *v).unwrap_or(false)
}

/// Install a panic hook that writes a crash report and terminates with the
/// crash exit code. The previous hook still runs first so the panic message
/// reaches stderr. Panics inside a [`contained`] scope are left to the
/// boundary that owns them.
pub fn install_panic_hook(supervisor: Arc<ProcessSupervisor>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        if in_contained_scope() {
            return;
        }
        let (code, _) = supervisor.crash_blocking(&info.to_string());
        supervisor.finish_exit(code);
    }));
}

/// IPC liveness probe: a `heartbeat` line is acknowledged with `ping`.
pub fn heartbeat_reply(probe: &str) -> Option<&'static str> {
    (probe.trim() == "heartbeat").then_some("ping")
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
