//! Fleet composition root
//!
//! A [`Fleet`] wires the naming directory, the master and the process manager
//! together, boots the locator and the initial pool, and hands out [`Vm`]
//! handles to the driver. It is created once per test run and torn down
//! through [`Fleet::teardown`].

use shared::logging::{log_shutdown, log_startup, log_success};
use shared::wire::ServerHandle;
use shared::{
    process_debug, process_info, process_warn, BounceResult, Endpoint, MethodResult, ProcessId, UnitOfWork, Version,
    VmId, WorkerKey, WorkerStub,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::child::{TaskContext, TaskExecutor, TaskRegistry};
use crate::config::FleetConfig;
use crate::core::NamingDirectory;
use crate::error::{FleetError, FleetResult};
use crate::master::{Master, MasterServer};
use crate::services::{DirectoryServer, PatternScanner, RealProcessManager, SuspectLog, SuspectScanner};
use crate::traits::ProcessManager;

/// Exit status used after an interrupt-triggered teardown
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Lifecycle of a fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetLifecycle {
    /// Constructed, nothing launched yet
    Created,
    /// Locator and initial pool are up
    Running,
    /// Every worker was killed; terminal
    TornDown,
}

/// Where a [`Vm`]'s work runs
#[derive(Clone)]
pub enum VmTarget {
    /// A spawned worker process
    Remote(WorkerStub),
    /// The coordinator's own process
    Local(Arc<TaskExecutor>),
}

/// Driver-side handle to one worker slot
#[derive(Clone)]
pub struct Vm {
    id: VmId,
    version: Version,
    target: VmTarget,
}

impl Vm {
    pub fn id(&self) -> VmId {
        self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Stub of the remote worker; `None` for the debug VM
    pub fn stub(&self) -> Option<&WorkerStub> {
        match &self.target {
            VmTarget::Remote(stub) => Some(stub),
            VmTarget::Local(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.target, VmTarget::Local(_))
    }

    /// Run a unit of work in this VM
    ///
    /// Failures of the work itself come back as [`MethodResult::Failure`];
    /// `Err` means the worker could not be reached.
    pub async fn invoke(&self, unit: &UnitOfWork) -> FleetResult<MethodResult> {
        match &self.target {
            VmTarget::Remote(stub) => stub.execute(unit).await.map_err(|e| FleetError::remote(&stub.name, e)),
            VmTarget::Local(executor) => Ok(executor.execute(unit.clone()).await),
        }
    }

    /// Run a unit of work and decode its return value
    pub async fn invoke_as<T: DeserializeOwned>(&self, unit: &UnitOfWork) -> FleetResult<T> {
        Ok(self.invoke(unit).await?.decode()?)
    }

    /// Liveness probe; failure means the worker died
    pub async fn ping(&self) -> FleetResult<()> {
        match &self.target {
            VmTarget::Remote(stub) => stub.ping().await.map_err(|e| FleetError::remote(&stub.name, e)),
            VmTarget::Local(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match &self.target {
            VmTarget::Remote(stub) => stub.to_string(),
            VmTarget::Local(_) => "local".to_string(),
        };
        f.debug_struct("Vm")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("target", &target)
            .finish()
    }
}

/// Test fleet: directory, master, locator and worker pool
pub struct Fleet<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    config: FleetConfig,
    directory: Arc<NamingDirectory>,
    process_manager: Arc<P>,
    master: Arc<Master<P>>,

    /// Network endpoints owned by the fleet (directory, master)
    servers: Mutex<Vec<ServerHandle>>,

    master_addr: Mutex<Option<SocketAddr>>,

    /// Serializes scale-up and bounces issued through the fleet
    table_lock: tokio::sync::Mutex<()>,

    /// Number of pool workers (ids `0..vm_count`)
    vm_count: AtomicU32,

    lifecycle: Mutex<FleetLifecycle>,

    suspect_log: Option<Mutex<SuspectLog>>,

    debug_vm: Arc<TaskExecutor>,
}

impl Fleet<RealProcessManager> {
    /// Boot a fleet of real worker processes
    pub async fn launch(config: FleetConfig) -> FleetResult<Self> {
        config.validate()?;

        let directory = Arc::new(NamingDirectory::new());
        let directory_server =
            DirectoryServer::start(directory.clone(), SocketAddr::new(config.bind_host, 0)).await?;
        let process_manager = Arc::new(RealProcessManager::new(
            config.clone(),
            directory.clone(),
            directory_server.local_addr(),
        ));

        let fleet = Self::create(config, directory, process_manager)?;
        fleet.add_server(directory_server);
        fleet.start().await?;
        Ok(fleet)
    }
}

impl<P> Fleet<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    /// Assemble a fleet around an existing directory and process manager
    pub fn create(
        config: FleetConfig,
        directory: Arc<NamingDirectory>,
        process_manager: Arc<P>,
    ) -> FleetResult<Self> {
        config.validate()?;
        ProcessId::init_coordinator();

        let master = Arc::new(Master::new(process_manager.clone(), config.startup_timeout));
        let suspect_log = config.suspect_log_path().map(|path| Mutex::new(SuspectLog::new(path)));
        let debug_vm = Arc::new(TaskExecutor::new(
            TaskRegistry::with_builtins(),
            TaskContext::new(VmId::Debug, Version::Current, 0),
        ));

        Ok(Self {
            config,
            directory,
            process_manager,
            master,
            servers: Mutex::new(Vec::new()),
            master_addr: Mutex::new(None),
            table_lock: tokio::sync::Mutex::new(()),
            vm_count: AtomicU32::new(0),
            lifecycle: Mutex::new(FleetLifecycle::Created),
            suspect_log,
            debug_vm,
        })
    }

    /// Replace the debug VM's task registry
    pub fn with_debug_registry(mut self, registry: TaskRegistry) -> Self {
        self.debug_vm = Arc::new(TaskExecutor::new(registry, TaskContext::new(VmId::Debug, Version::Current, 0)));
        self
    }

    /// Hand a server to the fleet so that teardown stops it
    pub fn add_server(&self, server: ServerHandle) {
        lock(&self.servers).push(server);
    }

    /// Bootstrap: master, locator, bootstrap service, initial pool
    ///
    /// On failure everything launched so far is killed.
    pub async fn start(&self) -> FleetResult<()> {
        match self.lifecycle() {
            FleetLifecycle::Created => {}
            FleetLifecycle::Running => return Ok(()),
            FleetLifecycle::TornDown => return Err(FleetError::TornDown),
        }

        log_startup(
            ProcessId::current(),
            &format!("fleet of {} VM(s) in {}", self.config.initial_vm_count, self.config.workspace_dir.display()),
        );

        if let Err(e) = self.bootstrap().await {
            shared::logging::log_error(ProcessId::current(), "Fleet bootstrap", &e);
            self.teardown().await;
            return Err(e);
        }

        *lock(&self.lifecycle) = FleetLifecycle::Running;
        log_success(ProcessId::current(), &format!("Fleet running, locator at {}", self.locator_string()));
        Ok(())
    }

    async fn bootstrap(&self) -> FleetResult<()> {
        self.prepare_workspace()?;

        let master_server = MasterServer::start(self.master.clone(), SocketAddr::new(self.config.bind_host, 0)).await?;
        let master_addr = master_server.local_addr();
        self.add_server(master_server);
        *lock(&self.master_addr) = Some(master_addr);

        self.directory.bind(
            &self.config.master_name,
            Endpoint {
                addr: master_addr,
                pid: std::process::id(),
                generation: 0,
            },
        )?;

        // Locator first; everything else needs its port
        self.process_manager
            .launch_vm(WorkerKey::current(VmId::Locator), false)
            .await?;
        self.wait_for_vms().await?;

        let port = self.start_locator().await?;
        self.master.set_locator_port(port);
        process_info!(ProcessId::current(), "📍 Bootstrap service listening on port {}", port);

        let count = self.config.initial_vm_count;
        for i in 0..count {
            self.process_manager
                .launch_vm(WorkerKey::current(VmId::Worker(i)), false)
                .await?;
        }
        self.wait_for_vms().await?;

        for i in 0..count {
            self.process_manager.get_stub(VmId::Worker(i)).await?;
        }
        self.vm_count.store(count, Ordering::SeqCst);
        Ok(())
    }

    fn prepare_workspace(&self) -> FleetResult<()> {
        std::fs::create_dir_all(self.config.dunit_dir())?;

        // Start every run with an empty suspect log
        if let Some(path) = self.config.suspect_log_path() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            // The coordinator, debug VM included, reports into the same file
            shared::logging::init_tracing_with_suspect_log(Some(&self.config.log_level), Some(&path))?;
        }
        Ok(())
    }

    async fn start_locator(&self) -> FleetResult<u16> {
        let stub = self.process_manager.get_stub(VmId::Locator).await?;
        let result = stub
            .execute(&UnitOfWork::new("start_locator"))
            .await
            .map_err(|e| FleetError::LocatorError { message: e.to_string() })?;

        match result {
            MethodResult::Failure { message, .. } => Err(FleetError::LocatorError { message }),
            value => value.decode::<u16>().map_err(|e| FleetError::LocatorError { message: e.to_string() }),
        }
    }

    async fn wait_for_vms(&self) -> FleetResult<()> {
        if self.process_manager.wait_for_vms(self.config.startup_timeout).await {
            Ok(())
        } else {
            Err(FleetError::StartupTimeout {
                timeout: self.config.startup_timeout,
            })
        }
    }

    fn ensure_running(&self) -> FleetResult<()> {
        match self.lifecycle() {
            FleetLifecycle::Running => Ok(()),
            FleetLifecycle::TornDown => Err(FleetError::TornDown),
            FleetLifecycle::Created => Err(FleetError::config("fleet has not been started")),
        }
    }

    /// Worker `id` on the current version
    pub async fn vm(&self, id: VmId) -> FleetResult<Vm> {
        self.vm_with_version(Version::Current, id).await
    }

    /// Worker `id` on `version`
    ///
    /// A present worker on another version is bounced onto `version`. An id
    /// beyond the pool grows the pool: every gap is filled with a
    /// current-version worker first, then the requested one is launched.
    pub async fn vm_with_version(&self, version: Version, id: VmId) -> FleetResult<Vm> {
        self.ensure_running()?;

        let n = match id {
            VmId::Debug => return Ok(self.debug_vm()),
            VmId::Locator if version.is_current() => return self.resolve(id).await,
            VmId::Locator => {
                let name = WorkerKey::new(id, version).vm_name();
                return Err(FleetError::launch(name, "the locator only runs the current version"));
            }
            VmId::Worker(n) => n,
        };

        let _table = self.table_lock.lock().await;
        let count = self.vm_count();

        if n < count {
            let current = self.process_manager.version_of(id).unwrap_or_default();
            if current != version {
                process_info!(ProcessId::current(), "🔄 Bouncing VM {} from version {} to {}", n, current, version);
                self.master.bounce_to(version, id).await?;
            }
            return self.resolve(id).await;
        }

        self.grow_to(count, n, version).await?;
        self.resolve(id).await
    }

    async fn grow_to(&self, count: u32, n: u32, version: Version) -> FleetResult<()> {
        process_info!(ProcessId::current(), "📈 Growing fleet from {} to {} VM(s)", count, n + 1);

        for i in count..n {
            self.process_manager
                .launch_vm(WorkerKey::current(VmId::Worker(i)), false)
                .await?;
        }
        self.wait_for_vms().await?;
        for i in count..n {
            self.process_manager.get_stub(VmId::Worker(i)).await?;
        }
        self.vm_count.store(n, Ordering::SeqCst);

        self.process_manager
            .launch_vm(WorkerKey::new(VmId::Worker(n), version), false)
            .await?;
        self.wait_for_vms().await?;
        self.process_manager.get_stub(VmId::Worker(n)).await?;
        self.vm_count.store(n + 1, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve(&self, id: VmId) -> FleetResult<Vm> {
        let stub = self.process_manager.get_stub(id).await?;
        Ok(Vm {
            id,
            version: self.process_manager.version_of(id).unwrap_or_default(),
            target: VmTarget::Remote(stub),
        })
    }

    /// The coordinator's own process as a VM
    pub fn debug_vm(&self) -> Vm {
        Vm {
            id: VmId::Debug,
            version: Version::Current,
            target: VmTarget::Local(self.debug_vm.clone()),
        }
    }

    /// Bounce a worker, keeping it on the current version
    pub async fn bounce(&self, id: VmId) -> FleetResult<BounceResult> {
        self.bounce_to(Version::Current, id).await
    }

    /// Kill a worker and relaunch it under `version`
    pub async fn bounce_to(&self, version: Version, id: VmId) -> FleetResult<BounceResult> {
        self.ensure_running()?;

        let _table = self.table_lock.lock().await;
        if let VmId::Worker(n) = id {
            if n >= self.vm_count() {
                return Err(FleetError::bounce(
                    id,
                    FleetError::NotBound {
                        name: WorkerKey::new(id, version).vm_name(),
                    },
                ));
            }
        }
        self.master.bounce_to(version, id).await
    }

    /// Bounce every worker that is not on the current version back onto it
    pub async fn reset_versions(&self) -> FleetResult<usize> {
        self.ensure_running()?;

        let _table = self.table_lock.lock().await;
        let mut bounced = 0;
        for n in 0..self.vm_count() {
            let id = VmId::Worker(n);
            if self.process_manager.version_of(id).is_some_and(|v| !v.is_current()) {
                self.master.bounce(id).await?;
                bounced += 1;
            }
        }
        Ok(bounced)
    }

    /// Number of pool workers (locator not included)
    pub fn vm_count(&self) -> u32 {
        self.vm_count.load(Ordering::SeqCst)
    }

    pub fn locator_port(&self) -> u16 {
        self.master.locator_port()
    }

    /// Locator address in `host[port]` form
    pub fn locator_string(&self) -> String {
        format!("localhost[{}]", self.locator_port())
    }

    /// Properties a member of the fleet's cluster needs to join it
    pub fn distributed_system_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("locators".to_string(), self.locator_string()),
            ("mcast-port".to_string(), "0".to_string()),
            ("log-level".to_string(), self.config.log_level.clone()),
        ])
    }

    pub fn lifecycle(&self) -> FleetLifecycle {
        *lock(&self.lifecycle)
    }

    pub fn is_launched(&self) -> bool {
        self.lifecycle() == FleetLifecycle::Running
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<NamingDirectory> {
        &self.directory
    }

    pub fn master(&self) -> &Arc<Master<P>> {
        &self.master
    }

    pub fn master_addr(&self) -> Option<SocketAddr> {
        *lock(&self.master_addr)
    }

    pub fn process_manager(&self) -> &Arc<P> {
        &self.process_manager
    }

    /// Single teardown entry point: kill every worker, stop the endpoints
    ///
    /// Idempotent; failures are logged, never returned.
    pub async fn teardown(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if *lifecycle == FleetLifecycle::TornDown {
                return;
            }
            *lifecycle = FleetLifecycle::TornDown;
        }

        self.process_manager.kill_vms().await;

        if self.process_manager.has_live_vms() {
            process_warn!(ProcessId::current(), "Some VMs were still alive after the kill sweep");
        }

        self.directory.unbind(&self.config.master_name);
        for server in lock(&self.servers).drain(..) {
            server.shutdown();
        }

        log_shutdown(ProcessId::current(), "fleet torn down");

        if let Some(path) = self.config.suspect_log_path() {
            shared::logging::detach_suspect_log(&path);
        }
    }

    /// Consume the suspect log with the default scanner
    pub fn close_and_check_for_suspects(&self) -> FleetResult<()> {
        self.close_and_check_for_suspects_with(&PatternScanner::new())
    }

    /// Consume the suspect log; fails if `scanner` flags anything
    ///
    /// A fleet that never started has nothing to check.
    pub fn close_and_check_for_suspects_with(&self, scanner: &dyn SuspectScanner) -> FleetResult<()> {
        if self.lifecycle() == FleetLifecycle::Created {
            return Ok(());
        }
        match &self.suspect_log {
            Some(log) => lock(log).close_and_check_for_suspects(scanner),
            None => Ok(()),
        }
    }
}

impl<P> Fleet<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    /// Best-effort Ctrl-C handler: kill every worker, then exit
    pub fn install_shutdown_signal_handler(self: &Arc<Self>) -> JoinHandle<()> {
        let fleet = Arc::downgrade(self);

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                process_debug!(ProcessId::current(), "Signal handler unavailable: {}", e);
                return;
            }

            process_warn!(ProcessId::current(), "🛑 Interrupted, killing all VMs");
            if let Some(fleet) = fleet.upgrade() {
                fleet.teardown().await;
            }
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
