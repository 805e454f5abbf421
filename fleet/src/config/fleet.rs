//! Fleet Configuration
//!
//! Everything the coordinator needs to boot, scale and tear down a fleet.

use shared::Version;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FleetError, FleetResult};

/// Default size of the initial worker pool
pub const NUM_VMS: u32 = 4;

/// Default bound on the readiness barrier
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Directory (under the workspace) holding per-worker working directories
pub const DUNIT_DIR: &str = "dunit";

/// File name of the suspect log inside the workspace
pub const SUSPECT_FILENAME: &str = "dunit_suspect.log";

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Worker binary used for the current version
    pub worker_executable: PathBuf,
    /// Worker binaries for other versions, keyed by version tag
    pub version_executables: HashMap<String, PathBuf>,
    /// Workers launched during bootstrap (besides the locator)
    pub initial_vm_count: u32,
    /// Bound on every readiness barrier wait
    pub startup_timeout: Duration,
    /// Root for working directories and the suspect log
    pub workspace_dir: PathBuf,
    /// Recreate working directories on every launch
    pub make_new_working_dirs: bool,
    /// Log level for coordinator-side filters and spawned workers
    pub log_level: String,
    /// Collect INFO+ output of every process into the suspect log
    pub suspect_log: bool,
    /// Interface the directory and master listen on
    pub bind_host: IpAddr,
    /// Directory name the master is bound under
    pub master_name: String,
    /// How often a worker checks that the master is still alive
    pub master_ping_interval: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            worker_executable: PathBuf::from("fleet-worker"),
            version_executables: HashMap::new(),
            initial_vm_count: NUM_VMS,
            startup_timeout: STARTUP_TIMEOUT,
            workspace_dir: PathBuf::from("."),
            make_new_working_dirs: false,
            log_level: "info".to_string(),
            suspect_log: true,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            master_name: shared::MASTER_NAME.to_string(),
            master_ping_interval: Duration::from_secs(1),
        }
    }
}

impl FleetConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::FleetConfigBuilder {
        crate::config::builder::FleetConfigBuilder::new()
    }

    /// Worker binary that runs the given version
    pub fn executable_for(&self, version: &Version) -> &Path {
        match version {
            Version::Current => &self.worker_executable,
            Version::Named(tag) => self
                .version_executables
                .get(tag)
                .map(PathBuf::as_path)
                .unwrap_or(&self.worker_executable),
        }
    }

    /// Parent of all per-worker working directories
    pub fn dunit_dir(&self) -> PathBuf {
        self.workspace_dir.join(DUNIT_DIR)
    }

    /// Working directory of one worker
    pub fn working_dir(&self, vm_name: &str) -> PathBuf {
        self.dunit_dir().join(vm_name)
    }

    /// Location of the suspect log, when enabled
    pub fn suspect_log_path(&self) -> Option<PathBuf> {
        self.suspect_log.then(|| self.workspace_dir.join(SUSPECT_FILENAME))
    }

    /// Reject configurations the fleet cannot boot with
    pub fn validate(&self) -> FleetResult<()> {
        if self.startup_timeout.is_zero() {
            return Err(FleetError::config("startup_timeout must be positive"));
        }
        if self.master_ping_interval.is_zero() {
            return Err(FleetError::config("master_ping_interval must be positive"));
        }
        if self.master_name.trim().is_empty() {
            return Err(FleetError::config("master_name cannot be empty"));
        }
        if self.worker_executable.as_os_str().is_empty() {
            return Err(FleetError::config("worker_executable cannot be empty"));
        }
        Ok(())
    }
}
