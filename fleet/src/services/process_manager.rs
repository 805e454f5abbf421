//! Real process management service implementation
//!
//! Spawns worker VMs as child processes, tracks them per slot and exposes the
//! readiness barrier they report into. The process table lock is never held
//! across an await, so a kill sweep can always make progress.

use async_trait::async_trait;
use shared::{process_debug, process_info, process_warn, ProcessId, Version, VmId, VmState, WorkerKey, WorkerStub};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::child::LaunchParams;
use crate::config::FleetConfig;
use crate::core::{NamingDirectory, ReadinessBarrier};
use crate::error::{FleetError, FleetResult};
use crate::services::process_output_handler::{configure_child_stdio, spawn_output_consumers};
use crate::traits::{ProcessManager, WorkerDescriptor};

/// How long a kill waits for the process to be reaped
const REAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle for a managed worker
struct ProcessHolder {
    key: WorkerKey,
    child: Option<Child>,
    generation: u64,
    state: VmState,
    pid: Option<u32>,
}

/// Real process manager implementation
pub struct RealProcessManager {
    config: FleetConfig,

    /// Directory the workers bind into
    directory: Arc<NamingDirectory>,

    /// Address workers reach the directory at
    directory_addr: SocketAddr,

    processes: Mutex<HashMap<VmId, ProcessHolder>>,

    barrier: ReadinessBarrier,

    next_generation: AtomicU64,

    /// Set by the kill sweep; later launches are refused
    shutting_down: AtomicBool,
}

impl RealProcessManager {
    pub fn new(config: FleetConfig, directory: Arc<NamingDirectory>, directory_addr: SocketAddr) -> Self {
        Self {
            config,
            directory,
            directory_addr,
            processes: Mutex::new(HashMap::new()),
            barrier: ReadinessBarrier::new(),
            next_generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn barrier(&self) -> &ReadinessBarrier {
        &self.barrier
    }

    fn processes(&self) -> MutexGuard<'_, HashMap<VmId, ProcessHolder>> {
        self.processes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn launch_params(&self, key: &WorkerKey, generation: u64) -> LaunchParams {
        LaunchParams {
            naming_addr: self.directory_addr,
            vm_id: key.id,
            vm_version: key.version.clone(),
            generation,
            workspace: self.config.workspace_dir.clone(),
            master_name: self.config.master_name.clone(),
            log_level: self.config.log_level.clone(),
            suspect_log: self.config.suspect_log_path(),
            master_ping_ms: self.config.master_ping_interval.as_millis() as u64,
        }
    }

    /// Create the worker's working directory, wiping it first when asked
    async fn prepare_working_dir(&self, vm_name: &str, force_new: bool) -> FleetResult<PathBuf> {
        let dir = self.config.working_dir(vm_name);

        if force_new || self.config.make_new_working_dirs {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(FleetError::launch(vm_name, format!("cannot clear {}: {e}", dir.display()))),
            }
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FleetError::launch(vm_name, format!("cannot create {}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// Spawn one incarnation of a worker; the slot must be free
    async fn spawn_worker(&self, key: WorkerKey, force_new_working_dir: bool) -> FleetResult<()> {
        let vm_name = key.vm_name();
        let working_dir = self.prepare_working_dir(&vm_name, force_new_working_dir).await?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let params = self.launch_params(&key, generation);
        let executable = self.config.executable_for(&key.version);

        let mut cmd = Command::new(executable);
        cmd.args(params.to_args()).current_dir(&working_dir).kill_on_drop(true);
        configure_child_stdio(&mut cmd, &vm_name);

        // Holder and barrier both carry the generation before the child exists,
        // so an early readiness signal always finds its slot
        {
            let mut processes = self.processes();
            if self.is_shutting_down() {
                return Err(FleetError::launch(&vm_name, "fleet is shutting down"));
            }
            processes.insert(
                key.id,
                ProcessHolder {
                    key: key.clone(),
                    child: None,
                    generation,
                    state: VmState::Launching,
                    pid: None,
                },
            );
            self.barrier.arm(key.id, generation);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.barrier.disarm(key.id);
                self.mark_dead(key.id, generation);
                return Err(FleetError::launch(
                    &vm_name,
                    format!("cannot spawn {}: {e}", executable.display()),
                ));
            }
        };
        let pid = child.id();
        spawn_output_consumers(&mut child, &vm_name);

        let orphan = {
            let mut processes = self.processes();
            match processes.get_mut(&key.id) {
                Some(holder) if holder.generation == generation && !self.is_shutting_down() => {
                    holder.child = Some(child);
                    holder.pid = pid;
                    None
                }
                _ => Some(child),
            }
        };
        if let Some(child) = orphan {
            // The kill sweep already passed this slot
            Self::kill_child(&vm_name, child).await;
            return Err(FleetError::launch(&vm_name, "fleet is shutting down"));
        }

        process_debug!(
            ProcessId::current(),
            "🏭 Spawned {} (PID: {:?}, generation {}) in {}",
            vm_name,
            pid,
            generation,
            working_dir.display()
        );
        Ok(())
    }

    fn mark_dead(&self, id: VmId, generation: u64) {
        if let Some(holder) = self.processes().get_mut(&id) {
            if holder.generation == generation {
                holder.state = VmState::Dead;
            }
        }
    }

    /// Free a slot whose relaunch failed so that it can be launched again
    fn abandon(&self, key: &WorkerKey) {
        if let Some(holder) = self.processes().get_mut(&key.id) {
            holder.state = VmState::Dead;
            holder.child = None;
        }
        self.barrier.disarm(key.id);
        self.directory.unbind(&key.vm_name());
    }

    /// Take the child out of a slot, marking the slot with `state`
    fn detach(&self, id: VmId, state: VmState) -> Option<(WorkerKey, Child)> {
        let mut processes = self.processes();
        let holder = processes.get_mut(&id)?;
        holder.state = state;
        let child = holder.child.take()?;
        Some((holder.key.clone(), child))
    }

    async fn kill_child(vm_name: &str, mut child: Child) {
        if let Err(e) = child.start_kill() {
            // Already exited; nothing left to kill
            process_debug!(ProcessId::current(), "Kill of {} skipped: {}", vm_name, e);
        }

        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                process_debug!(ProcessId::current(), "🛑 {} exited with {}", vm_name, status);
            }
            Ok(Err(e)) => {
                process_warn!(ProcessId::current(), "Could not reap {}: {}", vm_name, e);
            }
            Err(_) => {
                process_warn!(ProcessId::current(), "{} not reaped within {:?}", vm_name, REAP_TIMEOUT);
            }
        }
    }

    /// Working directory a worker is launched in
    pub fn working_dir(&self, key: &WorkerKey) -> PathBuf {
        self.config.working_dir(&key.vm_name())
    }
}

#[async_trait]
impl ProcessManager for RealProcessManager {
    async fn launch_vm(&self, key: WorkerKey, force_new_working_dir: bool) -> FleetResult<()> {
        let vm_name = key.vm_name();

        if self.is_shutting_down() {
            return Err(FleetError::launch(&vm_name, "fleet is shutting down"));
        }
        if key.id == VmId::Debug {
            return Err(FleetError::launch(&vm_name, "the debug VM runs in-process"));
        }

        let occupied = self
            .processes()
            .get(&key.id)
            .map(|holder| holder.state != VmState::Dead)
            .unwrap_or(false);
        if occupied {
            return Err(FleetError::launch(&vm_name, format!("slot {} already has a live worker", key.id)));
        }

        self.spawn_worker(key, force_new_working_dir).await
    }

    async fn wait_for_vms(&self, timeout: Duration) -> bool {
        let ready = self.barrier.wait_all(timeout).await;
        if !ready {
            process_warn!(
                ProcessId::current(),
                "⏰ {} VM(s) did not signal readiness within {:?}",
                self.barrier.pending_count(),
                timeout
            );
        }
        ready
    }

    async fn wait_for_vm(&self, id: VmId, timeout: Duration) -> bool {
        self.barrier.wait_for(id, timeout).await
    }

    async fn signal_vm_ready(&self, id: VmId, generation: u64) -> bool {
        if !self.barrier.signal(id, generation) {
            process_debug!(ProcessId::current(), "Ignoring readiness of {} generation {}", id, generation);
            return false;
        }

        if let Some(holder) = self.processes().get_mut(&id) {
            if holder.generation == generation {
                holder.state = VmState::Ready;
            }
        }
        true
    }

    async fn get_stub(&self, id: VmId) -> FleetResult<WorkerStub> {
        let (key, generation) = {
            let processes = self.processes();
            match processes.get(&id) {
                Some(holder) if matches!(holder.state, VmState::Launching | VmState::Ready) => {
                    (holder.key.clone(), holder.generation)
                }
                Some(holder) => return Err(FleetError::NotBound { name: holder.key.vm_name() }),
                None => {
                    return Err(FleetError::NotBound {
                        name: WorkerKey::current(id).vm_name(),
                    })
                }
            }
        };

        let name = key.vm_name();
        let endpoint = self.directory.lookup(&name)?;

        // An entry left by a killed incarnation is not this worker's stub
        if endpoint.generation != generation {
            return Err(FleetError::NotBound { name });
        }
        Ok(WorkerStub::new(name, endpoint))
    }

    async fn bounce(&self, key: WorkerKey) -> FleetResult<()> {
        let vm_name = key.vm_name();
        if self.is_shutting_down() {
            return Err(FleetError::launch(&vm_name, "fleet is shutting down"));
        }
        if key.id == VmId::Debug {
            return Err(FleetError::launch(&vm_name, "the debug VM has no process to bounce"));
        }

        if let Some((old_key, child)) = self.detach(key.id, VmState::Bounced) {
            process_info!(ProcessId::current(), "🔄 Bouncing {} as {}", old_key, vm_name);
            Self::kill_child(&old_key.vm_name(), child).await;

            if old_key.vm_name() != vm_name {
                self.directory.unbind(&old_key.vm_name());
            }
        }
        self.directory.expect_rebind(&vm_name);

        if let Err(e) = self.spawn_worker(key.clone(), true).await {
            process_warn!(ProcessId::current(), "Relaunch of {} failed: {}", vm_name, e);
            self.abandon(&key);
            return Err(e);
        }
        Ok(())
    }

    async fn kill_vms(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let children: Vec<(String, Child)> = {
            let mut processes = self.processes();
            processes
                .iter_mut()
                .filter_map(|(_, holder)| {
                    holder.state = VmState::Dead;
                    holder.child.take().map(|child| (holder.key.vm_name(), child))
                })
                .collect()
        };
        // Nothing launched from here on can become ready
        self.barrier.close();

        if children.is_empty() {
            return;
        }

        // Signal everything first so the reaps below overlap
        let mut children = children;
        for (vm_name, child) in children.iter_mut() {
            if let Err(e) = child.start_kill() {
                process_debug!(ProcessId::current(), "Kill of {} skipped: {}", vm_name, e);
            }
        }
        for (vm_name, child) in children {
            Self::kill_child(&vm_name, child).await;
        }

        process_info!(ProcessId::current(), "🛑 All VMs killed");
    }

    fn has_live_vms(&self) -> bool {
        self.processes().values_mut().any(|holder| match holder.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        })
    }

    fn version_of(&self, id: VmId) -> Option<Version> {
        self.processes().get(&id).map(|holder| holder.key.version.clone())
    }

    fn vm_state(&self, id: VmId) -> Option<VmState> {
        self.processes().get(&id).map(|holder| holder.state)
    }

    fn descriptors(&self) -> Vec<WorkerDescriptor> {
        let mut descriptors: Vec<_> = self
            .processes()
            .values()
            .map(|holder| WorkerDescriptor {
                key: holder.key.clone(),
                state: holder.state,
                generation: holder.generation,
                pid: holder.pid,
            })
            .collect();
        descriptors.sort_by_key(|d| d.key.id);
        descriptors
    }
}

impl Drop for RealProcessManager {
    fn drop(&mut self) {
        let processes = self.processes.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        for holder in processes.values_mut() {
            if let Some(mut child) = holder.child.take() {
                force_kill(&mut child);
            }
        }
    }
}

/// Synchronous SIGKILL for contexts that cannot await
fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => return,
            Err(_) => {}
        }
    }
    let _ = child.start_kill();
}
