//! Master coordination protocol

use serde::{Deserialize, Serialize};

use crate::remote::WorkerStub;
use crate::types::{Version, VmId};

/// Requests served by the master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MasterRequest {
    /// Port of the bootstrap service, 0 before it was started
    GetLocatorPort,

    /// Worker announces that its endpoint is bound
    SignalVmReady { id: VmId, generation: u64 },

    /// Liveness check for the coordinator itself
    Ping,

    /// Kill and relaunch a worker under the given version
    Bounce { id: VmId, version: Version },
}

/// Replies from the master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MasterResponse {
    LocatorPort(u16),
    /// `accepted` is false for duplicate or stale signals
    Ready { accepted: bool },
    Pong,
    Bounced(BounceResult),
    Error { message: String },
}

/// Outcome of a successful bounce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceResult {
    pub id: VmId,
    pub stub: WorkerStub,
}
