//! Service implementations
//!
//! This module contains the I/O-facing pieces of the coordinator: the real
//! process manager, the directory server and the suspect log checker.

pub mod directory_server;
pub mod process_manager;
pub mod process_output_handler;
pub mod suspect_log;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use directory_server::DirectoryServer;
pub use process_manager::RealProcessManager;
pub use suspect_log::{PatternScanner, SuspectLog, SuspectScanner};
