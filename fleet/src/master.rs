//! Master coordination endpoint
//!
//! Workers report readiness through the master and drivers request bounces
//! through it. Readiness bookkeeping is serialized by one lock; bounces are
//! serialized per worker slot.

use async_trait::async_trait;
use shared::wire::{self, RequestHandler, ServerHandle};
use shared::{
    process_debug, process_info, BounceResult, MasterRequest, MasterResponse, ProcessId, Version, VmId, WorkerKey,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{FleetError, FleetResult};
use crate::traits::ProcessManager;

/// Single coordination endpoint shared by all workers
pub struct Master<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    process_manager: Arc<P>,

    /// Guards readiness bookkeeping
    ready_lock: Mutex<()>,

    /// One lock per slot so that bounces of the same worker never overlap
    bounce_locks: std::sync::Mutex<HashMap<VmId, Arc<Mutex<()>>>>,

    /// Bootstrap service port, 0 until the locator started it
    locator_port: AtomicU16,

    startup_timeout: Duration,
}

impl<P> Master<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    pub fn new(process_manager: Arc<P>, startup_timeout: Duration) -> Self {
        Self {
            process_manager,
            ready_lock: Mutex::new(()),
            bounce_locks: std::sync::Mutex::new(HashMap::new()),
            locator_port: AtomicU16::new(0),
            startup_timeout,
        }
    }

    /// Record that a worker bound its endpoint; duplicates are no-ops
    pub async fn signal_vm_ready(&self, id: VmId, generation: u64) -> bool {
        let _guard = self.ready_lock.lock().await;
        let accepted = self.process_manager.signal_vm_ready(id, generation).await;
        if accepted {
            process_debug!(ProcessId::current(), "✅ VM {} (generation {}) is ready", id, generation);
        }
        accepted
    }

    pub fn ping(&self) {}

    pub fn locator_port(&self) -> u16 {
        self.locator_port.load(Ordering::SeqCst)
    }

    pub fn set_locator_port(&self, port: u16) {
        self.locator_port.store(port, Ordering::SeqCst);
    }

    /// Bounce a worker back onto the current version
    pub async fn bounce(&self, id: VmId) -> FleetResult<BounceResult> {
        self.bounce_to(Version::Current, id).await
    }

    /// Kill a worker, relaunch it under `version` and wait for it
    ///
    /// Any failure is reported as [`FleetError::BounceError`].
    pub async fn bounce_to(&self, version: Version, id: VmId) -> FleetResult<BounceResult> {
        // The bootstrap service lives in the locator and is only started once
        if id == VmId::Locator {
            let name = WorkerKey::new(id, version).vm_name();
            return Err(FleetError::bounce(id, FleetError::launch(name, "the locator cannot be bounced")));
        }

        let lock = self.bounce_lock(id);
        let _guard = lock.lock().await;

        process_info!(ProcessId::current(), "🔄 Bouncing VM {} to version {}", id, version);

        self.process_manager
            .bounce(WorkerKey::new(id, version))
            .await
            .map_err(|e| FleetError::bounce(id, e))?;

        if !self.process_manager.wait_for_vm(id, self.startup_timeout).await {
            return Err(FleetError::bounce(
                id,
                FleetError::StartupTimeout {
                    timeout: self.startup_timeout,
                },
            ));
        }

        let stub = self
            .process_manager
            .get_stub(id)
            .await
            .map_err(|e| FleetError::bounce(id, e))?;

        process_debug!(ProcessId::current(), "🔄 VM {} is back as {}", id, stub);
        Ok(BounceResult { id, stub })
    }

    fn bounce_lock(&self, id: VmId) -> Arc<Mutex<()>> {
        let mut locks = self.bounce_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// Serves [`MasterRequest`]s for a [`Master`]
pub struct MasterServer<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    master: Arc<Master<P>>,
}

impl<P> MasterServer<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    pub fn new(master: Arc<Master<P>>) -> Self {
        Self { master }
    }

    /// Start serving on `bind_addr` (port 0 picks an ephemeral port)
    pub async fn start(master: Arc<Master<P>>, bind_addr: SocketAddr) -> FleetResult<ServerHandle> {
        let handle = wire::serve(bind_addr, Arc::new(Self::new(master))).await?;
        process_debug!(ProcessId::current(), "🎛️ Master listening on {}", handle.local_addr());
        Ok(handle)
    }
}

#[async_trait]
impl<P> RequestHandler for MasterServer<P>
where
    P: ProcessManager + Send + Sync + 'static,
{
    type Request = MasterRequest;
    type Response = MasterResponse;

    async fn handle(&self, request: MasterRequest) -> MasterResponse {
        match request {
            MasterRequest::GetLocatorPort => MasterResponse::LocatorPort(self.master.locator_port()),
            MasterRequest::SignalVmReady { id, generation } => MasterResponse::Ready {
                accepted: self.master.signal_vm_ready(id, generation).await,
            },
            MasterRequest::Ping => {
                self.master.ping();
                MasterResponse::Pong
            }
            MasterRequest::Bounce { id, version } => match self.master.bounce_to(version, id).await {
                Ok(result) => MasterResponse::Bounced(result),
                Err(e) => MasterResponse::Error { message: e.to_string() },
            },
        }
    }
}
