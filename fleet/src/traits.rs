//! Trait definitions with mockall annotations for testing
//!
//! The process manager is the seam between the coordination logic (master,
//! fleet) and the operating system. Mocking it lets the coordination logic be
//! tested without spawning a single process.

use shared::{Version, VmId, VmState, WorkerKey, WorkerStub};
use std::time::Duration;

use crate::error::FleetResult;

/// Snapshot of one managed worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDescriptor {
    pub key: WorkerKey,
    pub state: VmState,
    pub generation: u64,
    pub pid: Option<u32>,
}

/// Process management abstraction
///
/// Owns the set of worker processes, launches and kills them and exposes the
/// readiness barrier they report into.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessManager: Send + Sync {
    /// Spawn a worker and arm the barrier for it
    ///
    /// Returns as soon as the process is spawned; readiness is awaited
    /// separately through [`ProcessManager::wait_for_vms`].
    async fn launch_vm(&self, key: WorkerKey, force_new_working_dir: bool) -> FleetResult<()>;

    /// Block until every launched worker has signalled, `false` on timeout
    async fn wait_for_vms(&self, timeout: Duration) -> bool;

    /// Block until one worker has signalled, `false` on timeout
    async fn wait_for_vm(&self, id: VmId, timeout: Duration) -> bool;

    /// Record a readiness signal; `false` for duplicates and stale launches
    async fn signal_vm_ready(&self, id: VmId, generation: u64) -> bool;

    /// Resolve the current incarnation of a worker through the directory
    async fn get_stub(&self, id: VmId) -> FleetResult<WorkerStub>;

    /// Force-kill a worker and relaunch it under the given version
    async fn bounce(&self, key: WorkerKey) -> FleetResult<()>;

    /// Force-kill every worker; safe to call repeatedly
    async fn kill_vms(&self);

    /// Advisory: whether any worker process is still running
    fn has_live_vms(&self) -> bool;

    /// Version the worker was last launched under
    fn version_of(&self, id: VmId) -> Option<Version>;

    fn vm_state(&self, id: VmId) -> Option<VmState>;

    /// All managed workers, ordered by id
    fn descriptors(&self) -> Vec<WorkerDescriptor>;
}
