//! Distributed test-fleet orchestrator
//!
//! Boots and supervises a pool of worker processes so that a test driver can
//! run work inside any of them and treat the pool as a miniature cluster.
//! The coordinator side ([`Fleet`], [`Master`], [`RealProcessManager`]) and
//! the worker side ([`child`]) live in the same crate; the `fleet-worker`
//! binary is the worker.

pub mod child;
pub mod config;
pub mod core;
pub mod error;
pub mod fleet;
pub mod master;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{FleetConfig, FleetConfigBuilder};
pub use core::{NameList, NamingDirectory, ReadinessBarrier};
pub use error::{FleetError, FleetResult};
pub use fleet::{Fleet, FleetLifecycle, Vm, VmTarget};
pub use master::{Master, MasterServer};
pub use services::{DirectoryServer, PatternScanner, RealProcessManager, SuspectLog, SuspectScanner};
pub use traits::{ProcessManager, WorkerDescriptor};
