//! Test helpers and builder patterns for fleet tests
//!
//! [`MockFleetBuilder`] assembles a [`Fleet`] around a [`MockProcessManager`]
//! that keeps a small fake process table. Workers are served in-process, so
//! stubs handed out by the mock answer real requests over the wire.

use fleet::child::{TaskContext, TaskExecutor, TaskRegistry, VmInfo, WorkerEndpoint};
use fleet::traits::MockProcessManager;
use fleet::{Fleet, FleetError, FleetResult, NamingDirectory, Vm};
use shared::wire::{self, ServerHandle};
use shared::{Endpoint, Version, VmId, WorkerKey, WorkerStub};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

use super::fixtures::TestFixtures;

/// Process table the mock process manager reports from
#[derive(Debug, Default)]
pub struct FakeTable {
    /// Every launch, in order
    pub launched: Vec<WorkerKey>,
    /// Every bounce, in order
    pub bounced: Vec<WorkerKey>,
    /// Number of kill sweeps
    pub kills: usize,
    slots: HashMap<VmId, (Version, u64)>,
    next_generation: u64,
}

impl FakeTable {
    fn start(&mut self, key: &WorkerKey) {
        self.next_generation += 1;
        self.slots.insert(key.id, (key.version.clone(), self.next_generation));
    }

    pub fn generation_of(&self, id: VmId) -> Option<u64> {
        self.slots.get(&id).map(|(_, generation)| *generation)
    }
}

/// Worker endpoint served from the test process
pub struct LocalWorker {
    pub server: ServerHandle,
}

impl LocalWorker {
    pub async fn start(id: VmId, registry: TaskRegistry) -> Self {
        let executor = Arc::new(TaskExecutor::new(registry, TaskContext::new(id, Version::Current, 1)));
        let server = wire::serve("127.0.0.1:0".parse().unwrap(), Arc::new(WorkerEndpoint::new(executor)))
            .await
            .expect("local worker binds");
        Self { server }
    }
}

/// Builder for fleets backed by a mock process manager
pub struct MockFleetBuilder {
    vms: u32,
    ready: bool,
    bounce_ready: bool,
    failing_launch: Option<VmId>,
    locator_registry: TaskRegistry,
}

impl MockFleetBuilder {
    /// Defaults: every launch succeeds and every wait is satisfied
    pub fn new() -> Self {
        Self {
            vms: TestFixtures::DEFAULT_VM_COUNT,
            ready: true,
            bounce_ready: true,
            failing_launch: None,
            locator_registry: TaskRegistry::with_builtins(),
        }
    }

    pub fn with_vms(mut self, vms: u32) -> Self {
        self.vms = vms;
        self
    }

    /// Make every pool-wide wait time out
    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Make waits for a single bounced worker time out
    pub fn bounced_never_ready(mut self) -> Self {
        self.bounce_ready = false;
        self
    }

    pub fn failing_launch_of(mut self, id: VmId) -> Self {
        self.failing_launch = Some(id);
        self
    }

    /// Tasks available on the locator
    pub fn with_locator_registry(mut self, registry: TaskRegistry) -> Self {
        self.locator_registry = registry;
        self
    }

    /// Build the fleet; it is not started yet
    pub async fn build(self) -> MockFleet {
        let workspace = TempDir::new().unwrap();
        let table = Arc::new(Mutex::new(FakeTable::default()));
        let locator = LocalWorker::start(VmId::Locator, self.locator_registry).await;
        let pool = LocalWorker::start(VmId::Worker(0), TaskRegistry::with_builtins()).await;

        let process_manager = mock_process_manager(
            &table,
            locator.server.local_addr(),
            pool.server.local_addr(),
            self.ready,
            self.bounce_ready,
            self.failing_launch,
        );

        let fleet = Fleet::create(
            TestFixtures::mock_config(workspace.path(), self.vms),
            Arc::new(NamingDirectory::new()),
            Arc::new(process_manager),
        )
        .expect("mock configuration is valid");

        MockFleet {
            fleet,
            table,
            _locator: locator,
            _pool: pool,
            _workspace: workspace,
        }
    }
}

impl Default for MockFleetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_process_manager(
    table: &Arc<Mutex<FakeTable>>,
    locator_addr: std::net::SocketAddr,
    pool_addr: std::net::SocketAddr,
    ready: bool,
    bounce_ready: bool,
    failing_launch: Option<VmId>,
) -> MockProcessManager {
    let mut process_manager = MockProcessManager::new();

    let t = table.clone();
    process_manager.expect_launch_vm().returning(move |key, _| {
        if Some(key.id) == failing_launch {
            return Err(FleetError::launch(key.vm_name(), "refused by test"));
        }
        let mut table = lock(&t);
        table.launched.push(key.clone());
        table.start(&key);
        Ok(())
    });

    process_manager.expect_wait_for_vms().returning(move |_| ready);
    process_manager.expect_wait_for_vm().returning(move |_, _| bounce_ready);
    process_manager.expect_signal_vm_ready().returning(|_, _| true);

    let t = table.clone();
    process_manager.expect_get_stub().returning(move |id| {
        let table = lock(&t);
        match table.slots.get(&id) {
            Some((version, generation)) => {
                let key = WorkerKey::new(id, version.clone());
                let addr = if id == VmId::Locator { locator_addr } else { pool_addr };
                Ok(WorkerStub::new(
                    key.vm_name(),
                    Endpoint {
                        addr,
                        pid: std::process::id(),
                        generation: *generation,
                    },
                ))
            }
            None => Err(FleetError::NotBound {
                name: WorkerKey::current(id).vm_name(),
            }),
        }
    });

    let t = table.clone();
    process_manager.expect_bounce().returning(move |key| {
        let mut table = lock(&t);
        table.bounced.push(key.clone());
        table.start(&key);
        Ok(())
    });

    let t = table.clone();
    process_manager.expect_kill_vms().returning(move || {
        lock(&t).kills += 1;
    });

    process_manager.expect_has_live_vms().returning(|| false);

    let t = table.clone();
    process_manager
        .expect_version_of()
        .returning(move |id| lock(&t).slots.get(&id).map(|(version, _)| version.clone()));

    process_manager.expect_vm_state().returning(|_| None);
    process_manager.expect_descriptors().returning(Vec::new);

    process_manager
}

fn lock(table: &Arc<Mutex<FakeTable>>) -> MutexGuard<'_, FakeTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock-backed fleet plus everything it relies on
pub struct MockFleet {
    pub fleet: Fleet<MockProcessManager>,
    pub table: Arc<Mutex<FakeTable>>,
    _locator: LocalWorker,
    _pool: LocalWorker,
    _workspace: TempDir,
}

impl MockFleet {
    pub fn table(&self) -> MutexGuard<'_, FakeTable> {
        lock(&self.table)
    }

    /// Ids launched so far, in launch order
    pub fn launched_ids(&self) -> Vec<VmId> {
        self.table().launched.iter().map(|key| key.id).collect()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Stdout logging for a test binary; repeated calls are harmless
    pub fn init_logging() {
        shared::logging::init_tracing_with_level(Some("debug"));
    }

    /// Ask a VM who it is
    pub async fn vm_info(vm: &Vm) -> FleetResult<VmInfo> {
        vm.invoke_as(&TestFixtures::vm_info_unit()).await
    }

    /// Unwrap a bounce error down to its cause
    pub fn bounce_cause(error: FleetError) -> FleetError {
        match error {
            FleetError::BounceError { source, .. } => *source,
            other => panic!("expected a bounce error, got {other:?}"),
        }
    }

    /// Whether a process with `pid` still exists
    #[cfg(unix)]
    pub fn process_exists(pid: u32) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), None::<Signal>).is_ok()
    }
}
