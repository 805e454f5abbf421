//! Client proxies for the directory, the master and worker endpoints

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};
use crate::messages::{
    BounceResult, DirectoryFault, DirectoryRequest, DirectoryResponse, MasterRequest, MasterResponse, MethodResult,
    UnitOfWork, WorkerRequest, WorkerResponse,
};
use crate::types::{Endpoint, Version, VmId};
use crate::wire;

/// Deadline for liveness probes
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote handle to one worker incarnation
///
/// Two stubs are equal only if they point at the same incarnation, so a
/// relaunched worker never compares equal to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerStub {
    pub name: String,
    pub endpoint: Endpoint,
}

impl WorkerStub {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.endpoint.addr
    }

    pub fn pid(&self) -> u32 {
        self.endpoint.pid
    }

    pub fn generation(&self) -> u64 {
        self.endpoint.generation
    }

    /// Run a unit of work on the worker
    ///
    /// `Ok` carries whatever the invoked code produced, including failures.
    /// `Err` means the worker could not be reached.
    pub async fn execute(&self, unit: &UnitOfWork) -> SharedResult<MethodResult> {
        let request = WorkerRequest::Execute(unit.clone());
        match wire::call(self.addr(), &request).await? {
            WorkerResponse::Result(result) => Ok(result),
            other => Err(unexpected("Execute", &other)),
        }
    }

    /// No-op round trip
    pub async fn ping(&self) -> SharedResult<()> {
        match wire::call_with_timeout(self.addr(), &WorkerRequest::Ping, PING_TIMEOUT).await? {
            WorkerResponse::Pong => Ok(()),
            other => Err(unexpected("Ping", &other)),
        }
    }
}

impl fmt::Display for WorkerStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.endpoint)
    }
}

/// Remote handle to the master coordination endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterStub {
    addr: SocketAddr,
}

impl MasterStub {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn get_locator_port(&self) -> SharedResult<u16> {
        match wire::call(self.addr, &MasterRequest::GetLocatorPort).await? {
            MasterResponse::LocatorPort(port) => Ok(port),
            other => Err(master_reply("GetLocatorPort", other)),
        }
    }

    /// Returns whether the signal was accepted (false for duplicates or stale launches)
    pub async fn signal_vm_ready(&self, id: VmId, generation: u64) -> SharedResult<bool> {
        match wire::call(self.addr, &MasterRequest::SignalVmReady { id, generation }).await? {
            MasterResponse::Ready { accepted } => Ok(accepted),
            other => Err(master_reply("SignalVmReady", other)),
        }
    }

    pub async fn ping(&self) -> SharedResult<()> {
        match wire::call_with_timeout(self.addr, &MasterRequest::Ping, PING_TIMEOUT).await? {
            MasterResponse::Pong => Ok(()),
            other => Err(master_reply("Ping", other)),
        }
    }

    pub async fn bounce(&self, id: VmId) -> SharedResult<BounceResult> {
        self.bounce_to(Version::Current, id).await
    }

    pub async fn bounce_to(&self, version: Version, id: VmId) -> SharedResult<BounceResult> {
        match wire::call(self.addr, &MasterRequest::Bounce { id, version }).await? {
            MasterResponse::Bounced(result) => Ok(result),
            other => Err(master_reply("Bounce", other)),
        }
    }
}

/// Remote client of the naming directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryClient {
    addr: SocketAddr,
}

impl DirectoryClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind a name; `Ok(Err(fault))` when the directory refused the binding
    pub async fn bind(&self, name: &str, endpoint: Endpoint) -> SharedResult<Result<(), DirectoryFault>> {
        let request = DirectoryRequest::Bind {
            name: name.to_string(),
            endpoint,
        };
        match wire::call(self.addr, &request).await? {
            DirectoryResponse::Bound => Ok(Ok(())),
            DirectoryResponse::Error(fault) => Ok(Err(fault)),
            other => Err(unexpected("Bind", &other)),
        }
    }

    pub async fn lookup(&self, name: &str) -> SharedResult<Result<Endpoint, DirectoryFault>> {
        let request = DirectoryRequest::Lookup { name: name.to_string() };
        match wire::call(self.addr, &request).await? {
            DirectoryResponse::Found(endpoint) => Ok(Ok(endpoint)),
            DirectoryResponse::Error(fault) => Ok(Err(fault)),
            other => Err(unexpected("Lookup", &other)),
        }
    }

    pub async fn list(&self) -> SharedResult<Vec<String>> {
        match wire::call(self.addr, &DirectoryRequest::List).await? {
            DirectoryResponse::Names(names) => Ok(names),
            other => Err(unexpected("List", &other)),
        }
    }

    /// Resolve the master's endpoint
    pub async fn master(&self, master_name: &str) -> SharedResult<MasterStub> {
        match self.lookup(master_name).await? {
            Ok(endpoint) => Ok(MasterStub::new(endpoint.addr)),
            Err(fault) => Err(SharedError::ProtocolError {
                message: fault.to_string(),
            }),
        }
    }
}

fn unexpected<T: fmt::Debug>(request: &str, reply: &T) -> SharedError {
    SharedError::ProtocolError {
        message: format!("unexpected reply to {request}: {reply:?}"),
    }
}

fn master_reply(request: &str, reply: MasterResponse) -> SharedError {
    match reply {
        MasterResponse::Error { message } => SharedError::ProtocolError {
            message: format!("{request} refused: {message}"),
        },
        other => unexpected(request, &other),
    }
}
