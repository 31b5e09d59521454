use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use anyhow::{Context, Result};
use courtbot_channel::LogLevel;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

pub const LOG_FILE: &str = "logs/courtbot.log";
pub const EVENT_FILE: &str = "logs/requests.json";

/// Install file-based logging under `root` and return the request recorder.
///
/// Stdout is left to the channels.
pub fn init_tracing(root: &Path, log_level: LogLevel) -> Result<FileTelemetry> {
    FileTelemetry::init_files(log_level.as_directive(), root.join(LOG_FILE), root.join(EVENT_FILE))
}

/// Request counters plus the rolling text and JSON log files.
#[derive(Debug, Default)]
pub struct FileTelemetry {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
}

impl FileTelemetry {
    /// Counters only; nothing is installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// - `log_level` is an `EnvFilter` directive (e.g. `"info"`).
    /// - `log_file` is the rolling text log.
    /// - `event_file` is the rolling JSON log of `target: "request"` events.
    pub fn init_files(log_level: &str, log_file: PathBuf, event_file: PathBuf) -> Result<Self> {
        let txt_appender = rolling_appender(&log_file)?;
        let txt_layer = fmt::layer()
            .with_writer(txt_appender)
            .with_ansi(false)
            .with_filter(EnvFilter::new(log_level));

        let json_appender = rolling_appender(&event_file)?;
        let json_layer = fmt::layer()
            .json()
            .with_writer(json_appender)
            .with_target(true)
            .with_filter(EnvFilter::new("request=info"));

        Registry::default()
            .with(txt_layer)
            .with(json_layer)
            .try_init()
            .context("a global tracing subscriber is already installed")?;

        Ok(Self::new())
    }

    /// Run `handler`, log its outcome and emit one JSON `request` event
    /// with the name, latency and status.
    pub async fn instrument_request<F, Fut, T, E>(&self, name: &str, handler: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = handler().await;
        let elapsed = start.elapsed().as_secs_f64() * 1_000.0;

        match &result {
            Ok(_) => {
                self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
                info!("request `{}` succeeded in {} ms", name, elapsed);
            }
            Err(err) => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "request `{}` failed in {} ms", name, elapsed);
            }
        }

        tracing::event!(
            target: "request",
            tracing::Level::INFO,
            request = name,
            latency_ms = elapsed,
            status = if result.is_ok() { "ok" } else { "error" },
        );

        result
    }

    /// (started, succeeded, failed)
    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.requests_started.load(Ordering::Relaxed),
            self.requests_succeeded.load(Ordering::Relaxed),
            self.requests_failed.load(Ordering::Relaxed),
        )
    }
}

fn rolling_appender(path: &Path) -> Result<RollingFileAppender> {
    let dir = path
        .parent()
        .with_context(|| format!("log path {} has no parent directory", path.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("log path {} has no file name", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(RollingFileAppender::new(Rotation::DAILY, dir, file_name))
}
