use std::path::{Path, PathBuf};

use chrono::Local;

use crate::platform::ConnectionStats;

/// Which tier of failure a report documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    /// Unhandled asynchronous failure; the process keeps running.
    Error,
    /// Unrecoverable fault; the process terminates after writing this.
    Crash,
}

impl ReportKind {
    pub fn noun(self) -> &'static str {
        match self {
            ReportKind::Error => "error",
            ReportKind::Crash => "crash",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ReportKind::Error => "Unhandled failure in a background task.",
            ReportKind::Crash => "Uncaught fatal error.",
        }
    }
}

/// Everything the report template needs beyond ambient process state.
#[derive(Clone, Copy, Debug)]
pub struct ReportInput<'a> {
    pub kind: ReportKind,
    pub detail: &'a str,
    pub last_task: &'a str,
    pub commit: Option<&'a str>,
    pub stats: ConnectionStats,
}

#[derive(Clone, Debug)]
pub struct Report {
    pub body: String,
    pub path: PathBuf,
}

/// Render a report and the `{base}/{kind}-reports/{kind}-{ts}.txt` path it
/// belongs at. Pure; writing is the caller's decision.
pub fn build(base: &Path, input: ReportInput<'_>) -> Report {
    let stamp = Local::now().format("%Y-%-m-%-d_%-H.%-M.%-S").to_string();
    let kind = input.kind.noun();

    let argv: Vec<String> = std::env::args()
        .enumerate()
        .map(|(i, arg)| format!("arguments[{i}]: {arg}"))
        .collect();

    let latency = input
        .stats
        .latency_ms
        .map(|ms| ms.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let ready_at = input
        .stats
        .ready_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "error on before getting ready".to_string());

    let body = format!(
        "--- BlackListener {kind_title} Report ---\n\
         \n\
         Time: {stamp}\n\
         Description: {description}\n\
         \n\
         {detail}\n\
         \n\
         --- Process Details ---\n\
         \x20   Last Dispatched Task: {last_task} (may not be the failing task)\n\
         \n\
         \x20   BlackListener Version: {version}\n\
         \x20   BlackListener Commit: {commit}\n\
         \n\
         \x20   Arguments: {argc}\n\
         \x20   {argv}\n\
         \n\
         \x20   Launched in PID: {pid}\n\
         \n\
         --- Gateway ---\n\
         \x20   Average ping of websocket: {latency}\n\
         \x20   Ready at: {ready_at}\n\
         \n\
         --- System Details ---\n\
         \x20   CPU Architecture: {arch}\n\
         \x20   Platform: {os}\n\
         \x20   Memory Usage: {rss}\n",
        kind_title = capitalize(kind),
        description = input.kind.description(),
        detail = input.detail,
        last_task = input.last_task,
        version = env!("CARGO_PKG_VERSION"),
        commit = input.commit.unwrap_or("unknown"),
        argc = argv.len(),
        argv = argv.join("\n    "),
        pid = std::process::id(),
        arch = std::env::consts::ARCH,
        os = std::env::consts::OS,
        rss = rss_display(),
    );

    let path = base
        .join(format!("{kind}-reports"))
        .join(format!("{kind}-{stamp}.txt"));

    Report { body, path }
}

/// Persist a report with plain blocking I/O.
///
/// The crash path relies on this completing before the process exits, so
/// there is deliberately no async involved.
pub fn write_blocking(report: &Report) -> std::io::Result<()> {
    if let Some(parent) = report.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&report.path, &report.body)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn rss_display() -> String {
    match rss_kb() {
        Some(kb) => format!("{:.2}MB", kb as f64 / 1024.0),
        None => "unavailable".to_string(),
    }
}

#[cfg(target_os = "linux")]
fn rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn rss_kb() -> Option<u64> {
    None
}
