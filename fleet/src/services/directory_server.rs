//! Network front end of the naming directory

use async_trait::async_trait;
use shared::wire::{self, RequestHandler, ServerHandle};
use shared::{process_debug, DirectoryFault, DirectoryRequest, DirectoryResponse, ProcessId};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::NamingDirectory;
use crate::error::{FleetError, FleetResult};

/// Serves [`DirectoryRequest`]s against a shared [`NamingDirectory`]
pub struct DirectoryServer {
    directory: Arc<NamingDirectory>,
}

impl DirectoryServer {
    pub fn new(directory: Arc<NamingDirectory>) -> Self {
        Self { directory }
    }

    /// Start serving on `bind_addr` (port 0 picks an ephemeral port)
    pub async fn start(directory: Arc<NamingDirectory>, bind_addr: SocketAddr) -> FleetResult<ServerHandle> {
        let handle = wire::serve(bind_addr, Arc::new(Self::new(directory))).await?;
        process_debug!(ProcessId::current(), "📇 Naming directory listening on {}", handle.local_addr());
        Ok(handle)
    }
}

#[async_trait]
impl RequestHandler for DirectoryServer {
    type Request = DirectoryRequest;
    type Response = DirectoryResponse;

    async fn handle(&self, request: DirectoryRequest) -> DirectoryResponse {
        match request {
            DirectoryRequest::Bind { name, endpoint } => match self.directory.bind(&name, endpoint.clone()) {
                Ok(()) => {
                    process_debug!(ProcessId::current(), "📌 Bound {} -> {}", name, endpoint);
                    DirectoryResponse::Bound
                }
                Err(_) => DirectoryResponse::Error(DirectoryFault::DuplicateName(name)),
            },
            DirectoryRequest::Lookup { name } => match self.directory.lookup(&name) {
                Ok(endpoint) => DirectoryResponse::Found(endpoint),
                Err(_) => DirectoryResponse::Error(DirectoryFault::NotFound(name)),
            },
            DirectoryRequest::List => DirectoryResponse::Names(self.directory.list().to_vec()),
            DirectoryRequest::Unbind { name } => {
                self.directory.unbind(&name);
                DirectoryResponse::Unbound
            }
        }
    }
}

/// Translate a directory refusal into the coordinator's error type
pub fn fault_to_error(fault: DirectoryFault) -> FleetError {
    match fault {
        DirectoryFault::DuplicateName(name) => FleetError::DuplicateName { name },
        DirectoryFault::NotFound(name) => FleetError::NotBound { name },
    }
}
