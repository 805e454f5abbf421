//! Shared logging utilities for consistent tracing across all processes

use crate::types::ProcessId;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

/// Target under which the coordinator re-logs captured worker output
///
/// Kept out of the suspect log: each worker writes its own lines there.
pub const CHILD_OUTPUT_TARGET: &str = "child_output";

/// Suspect log this process currently appends to
struct AttachedLog {
    path: PathBuf,
    file: Arc<File>,
}

static SUSPECT_LOG: Mutex<Option<AttachedLog>> = Mutex::new(None);

fn attached() -> MutexGuard<'static, Option<AttachedLog>> {
    SUSPECT_LOG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writer for the suspect layer; events are dropped while nothing is attached
struct SuspectWriter;

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SuspectWriter {
    type Writer = SuspectLine;

    fn make_writer(&'a self) -> Self::Writer {
        SuspectLine(attached().as_ref().map(|log| log.file.clone()))
    }
}

struct SuspectLine(Option<Arc<File>>);

impl Write for SuspectLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(file) => {
                let mut file: &File = file;
                file.write(buf)
            }
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.0 {
            Some(file) => {
                let mut file: &File = file;
                file.flush()
            }
            None => Ok(()),
        }
    }
}

/// Level filter directive for the current process
fn level_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");

    match ProcessId::current() {
        ProcessId::Coordinator => {
            format!("fleet={base_level},shared={base_level},{CHILD_OUTPUT_TARGET}={base_level}")
        }
        ProcessId::Vm(_) => format!("fleet={base_level},fleet_worker={base_level},shared={base_level}"),
    }
}

/// Initialize tracing for the current process
///
/// Events go to stdout, and INFO+ events also go to the suspect log once one
/// is attached. Safe to call more than once; only the first call installs a
/// subscriber.
pub fn init_tracing_with_level(log_level: Option<&str>) {
    use tracing::Level;
    use tracing_subscriber::filter::filter_fn;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(EnvFilter::new(level_filter(log_level)));

    let suspect_layer = fmt::layer()
        .with_writer(SuspectWriter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(filter_fn(|meta| {
            *meta.level() <= Level::INFO && meta.target() != CHILD_OUTPUT_TARGET
        }));

    let _ = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(suspect_layer)
        .try_init();
}

/// Initialize tracing with stdout output plus an optional suspect log
///
/// Every INFO+ event is appended to the suspect log so that a post-run check
/// can scan it for unexpected errors.
pub fn init_tracing_with_suspect_log(log_level: Option<&str>, suspect_log: Option<&Path>) -> io::Result<()> {
    init_tracing_with_level(log_level);
    match suspect_log {
        Some(path) => attach_suspect_log(path),
        None => Ok(()),
    }
}

/// Append this process's INFO+ events to `path` from now on
///
/// Replaces any previously attached file. Has no effect on events if a
/// subscriber other than the one from [`init_tracing_with_level`] is installed.
pub fn attach_suspect_log(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    *attached() = Some(AttachedLog {
        path: path.to_path_buf(),
        file: Arc::new(file),
    });
    Ok(())
}

/// Stop appending to `path`; returns whether it was the attached file
pub fn detach_suspect_log(path: &Path) -> bool {
    let mut attached = attached();
    if attached.as_ref().is_some_and(|log| log.path == path) {
        *attached = None;
        return true;
    }
    false
}

/// Suspect log currently attached, if any
pub fn attached_suspect_log() -> Option<PathBuf> {
    attached().as_ref().map(|log| log.path.clone())
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($process_id:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$process_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(process_id: &ProcessId, details: &str) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(process_id: &ProcessId, reason: &str) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(process_id: &ProcessId, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %process_id,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(process_id: &ProcessId, message: &str) {
    info!(
        process = %process_id,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
