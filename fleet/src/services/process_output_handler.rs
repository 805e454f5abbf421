//! Helper to handle worker process stdout/stderr output
//!
//! Worker output is always piped. Each line is re-logged by the coordinator
//! with the worker's name as prefix, which also keeps the child from blocking
//! on a full pipe.

use shared::logging::CHILD_OUTPUT_TARGET;
use shared::{process_debug, ProcessId};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Pipe stdout/stderr of a worker and detach stdin
pub fn configure_child_stdio(cmd: &mut Command, vm_name: &str) {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());

    process_debug!(ProcessId::current(), "🔗 {} output will be re-logged with a [{}] prefix", vm_name, vm_name);
}

/// Spawn tasks that drain the worker's piped output into the coordinator log
pub fn spawn_output_consumers(child: &mut Child, vm_name: &str) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(relay_lines(stdout, vm_name.to_string(), false));
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(relay_lines(stderr, vm_name.to_string(), true));
    }
}

async fn relay_lines<R>(stream: R, vm_name: String, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(target: CHILD_OUTPUT_TARGET, "[{}] {}", vm_name, line);
        } else {
            tracing::info!(target: CHILD_OUTPUT_TARGET, "[{}] {}", vm_name, line);
        }
    }
}
