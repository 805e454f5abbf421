//! Message types for the fleet system
//!
//! This module organizes all inter-process communication messages by endpoint:
//! - `directory`: anyone ↔ naming directory
//! - `master`: worker/driver ↔ master coordination endpoint
//! - `worker`: coordinator ↔ worker execution endpoint

pub mod directory;
pub mod master;
pub mod worker;

pub use directory::{DirectoryFault, DirectoryRequest, DirectoryResponse};
pub use master::{BounceResult, MasterRequest, MasterResponse};
pub use worker::{MethodResult, UnitOfWork, WorkerRequest, WorkerResponse};
