//! Fleet-specific error types

use shared::{SharedError, VmId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Failed to launch {vm}: {reason}")]
    LaunchError { vm: String, reason: String },

    #[error("VMs did not start up within {} seconds", timeout.as_secs())]
    StartupTimeout { timeout: Duration },

    #[error("Name not bound in directory: {name}")]
    NotBound { name: String },

    #[error("Name already bound in directory: {name}")]
    DuplicateName { name: String },

    #[error("Failed to bounce VM {id}: {source}")]
    BounceError {
        id: VmId,
        #[source]
        source: Box<FleetError>,
    },

    #[error("Remote endpoint {name} unreachable: {reason}")]
    RemoteUnreachable { name: String, reason: String },

    #[error("Bootstrap service failed to start: {message}")]
    LocatorError { message: String },

    #[error("Suspicious strings were written to the log during this run.\n{report}")]
    SuspectStrings { report: String },

    #[error("Fleet has been torn down")]
    TornDown,

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FleetError {
    pub fn launch(vm: impl Into<String>, reason: impl Into<String>) -> Self {
        FleetError::LaunchError {
            vm: vm.into(),
            reason: reason.into(),
        }
    }

    pub fn bounce(id: VmId, source: FleetError) -> Self {
        FleetError::BounceError {
            id,
            source: Box::new(source),
        }
    }

    pub fn config(field: impl Into<String>) -> Self {
        FleetError::ConfigurationError { field: field.into() }
    }

    /// Classify a transport error against a named endpoint
    pub fn remote(name: &str, error: SharedError) -> Self {
        if error.is_unreachable() {
            FleetError::RemoteUnreachable {
                name: name.to_string(),
                reason: error.to_string(),
            }
        } else {
            FleetError::SharedError(error)
        }
    }

    /// Infrastructure failure that means the worker process is gone
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FleetError::RemoteUnreachable { .. })
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
