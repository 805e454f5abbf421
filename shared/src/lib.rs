//! Shared types for the test-fleet system
//!
//! Contains the identifiers, wire messages, transport and logging helpers used
//! by both the coordinating process and the worker processes it spawns.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod remote;
pub mod types;
pub mod wire;

pub use errors::*;
pub use types::*;

pub use messages::{
    // Naming directory protocol
    DirectoryFault, DirectoryRequest, DirectoryResponse,

    // Master coordination protocol
    BounceResult, MasterRequest, MasterResponse,

    // Worker execution protocol
    MethodResult, UnitOfWork, WorkerRequest, WorkerResponse,
};

pub use remote::{DirectoryClient, MasterStub, WorkerStub};
