//! Worker process runtime
//!
//! Everything that runs inside a spawned worker: launch parameters, the task
//! registry, the executor and the startup handshake with the coordinator.

pub mod executor;
pub mod tasks;

pub use executor::{TaskExecutor, WorkerEndpoint};
pub use tasks::{TaskContext, TaskRegistry, VmInfo};

use clap::Parser;
use shared::logging::{init_tracing_with_suspect_log, log_shutdown, log_startup, log_success};
use shared::{
    process_debug, process_info, process_warn, wire, DirectoryClient, Endpoint, ProcessId, Version, VmId, WorkerKey,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FleetError, FleetResult};
use crate::services::directory_server::fault_to_error;

/// Parameters the coordinator hands to every worker it spawns
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "fleet-worker")]
#[command(about = "Worker VM of a test fleet")]
pub struct LaunchParams {
    /// Address of the naming directory
    #[arg(long)]
    pub naming_addr: SocketAddr,

    /// Slot of this worker (`locator`, or a number)
    #[arg(long)]
    pub vm_id: VmId,

    /// Version tag this worker runs as
    #[arg(long, default_value = "current")]
    pub vm_version: Version,

    /// Launch generation assigned by the coordinator
    #[arg(long)]
    pub generation: u64,

    /// Fleet workspace directory
    #[arg(long)]
    pub workspace: PathBuf,

    /// Directory name of the master
    #[arg(long, default_value = shared::MASTER_NAME)]
    pub master_name: String,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Append INFO+ log lines to this file
    #[arg(long)]
    pub suspect_log: Option<PathBuf>,

    /// Master liveness check interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub master_ping_ms: u64,
}

impl LaunchParams {
    pub fn key(&self) -> WorkerKey {
        WorkerKey::new(self.vm_id, self.vm_version.clone())
    }

    /// Command line reproducing these parameters
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--naming-addr".to_string(),
            self.naming_addr.to_string(),
            "--vm-id".to_string(),
            self.vm_id.to_string(),
            "--vm-version".to_string(),
            self.vm_version.to_string(),
            "--generation".to_string(),
            self.generation.to_string(),
            "--workspace".to_string(),
            self.workspace.display().to_string(),
            "--master-name".to_string(),
            self.master_name.clone(),
            "--log-level".to_string(),
            self.log_level.clone(),
            "--master-ping-ms".to_string(),
            self.master_ping_ms.to_string(),
        ];
        if let Some(path) = &self.suspect_log {
            args.push("--suspect-log".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Run a worker until the master goes away
///
/// Opens the worker endpoint, binds it in the directory, then signals
/// readiness. Binding first guarantees that a ready worker is resolvable.
pub async fn run(params: LaunchParams, registry: TaskRegistry) -> FleetResult<()> {
    let process_id = ProcessId::init_vm(params.vm_id);
    init_tracing_with_suspect_log(Some(&params.log_level), params.suspect_log.as_deref())?;

    let key = params.key();
    let vm_name = key.vm_name();
    log_startup(process_id, &format!("{} (generation {})", vm_name, params.generation));

    let context = TaskContext::new(params.vm_id, params.vm_version.clone(), params.generation);
    let executor = Arc::new(TaskExecutor::new(registry, context));
    let server = wire::serve(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        Arc::new(WorkerEndpoint::new(executor.clone())),
    )
    .await?;

    let endpoint = Endpoint {
        addr: server.local_addr(),
        pid: std::process::id(),
        generation: params.generation,
    };

    let directory = DirectoryClient::new(params.naming_addr);
    directory
        .bind(&vm_name, endpoint.clone())
        .await
        .map_err(|e| FleetError::remote("naming directory", e))?
        .map_err(fault_to_error)?;
    process_debug!(process_id, "📌 Bound {} at {}", vm_name, endpoint);

    let master = directory
        .master(&params.master_name)
        .await
        .map_err(|e| FleetError::remote(&params.master_name, e))?;

    let accepted = master
        .signal_vm_ready(params.vm_id, params.generation)
        .await
        .map_err(|e| FleetError::remote(&params.master_name, e))?;
    if !accepted {
        process_warn!(process_id, "Readiness of generation {} was not accepted, exiting", params.generation);
        server.shutdown();
        return Ok(());
    }

    match master.get_locator_port().await {
        Ok(port) => {
            executor.context().learn_locator_port(port);
        }
        Err(e) => {
            process_debug!(process_id, "Locator port unavailable: {}", e);
        }
    }
    log_success(process_id, &format!("{} ready", vm_name));

    let interval = Duration::from_millis(params.master_ping_ms.max(1));
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = master.ping().await {
            process_info!(process_id, "Master no longer answers: {}", e);
            break;
        }
    }

    server.shutdown();
    log_shutdown(process_id, "master unreachable");
    Ok(())
}
