//! Core coordination state
//!
//! In-memory structures with no I/O of their own: the naming directory and the
//! readiness barrier. Both are shared by the network-facing services.

pub mod barrier;
pub mod directory;

pub use barrier::ReadinessBarrier;
pub use directory::{NameList, NamingDirectory};
