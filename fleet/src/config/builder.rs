//! Fleet Configuration Builder
//!
//! Provides a fluent builder for constructing fleet configurations

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::FleetConfig;

pub struct FleetConfigBuilder {
    config: FleetConfig,
}

impl FleetConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FleetConfig::default(),
        }
    }

    /// Worker binary for the current version
    pub fn worker_executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.worker_executable = path.into();
        self
    }

    /// Worker binary for another version
    pub fn version_executable<S: Into<String>, P: Into<PathBuf>>(mut self, version: S, path: P) -> Self {
        self.config.version_executables.insert(version.into(), path.into());
        self
    }

    /// Number of workers launched at bootstrap
    pub fn vms(mut self, count: u32) -> Self {
        self.config.initial_vm_count = count;
        self
    }

    /// Bound on the readiness barrier
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    /// Root for working directories and the suspect log
    pub fn workspace_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.workspace_dir = dir.into();
        self
    }

    /// Recreate working directories on every launch
    pub fn make_new_working_dirs(mut self, enabled: bool) -> Self {
        self.config.make_new_working_dirs = enabled;
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Enable or disable the suspect log
    pub fn suspect_log(mut self, enabled: bool) -> Self {
        self.config.suspect_log = enabled;
        self
    }

    /// Interface the coordinator endpoints listen on
    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.config.bind_host = host;
        self
    }

    /// Directory name of the master
    pub fn master_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.master_name = name.into();
        self
    }

    /// Interval of the worker-side master liveness check
    pub fn master_ping_interval(mut self, interval: Duration) -> Self {
        self.config.master_ping_interval = interval;
        self
    }

    /// Build the configuration
    pub fn build(self) -> FleetConfig {
        self.config
    }
}

impl Default for FleetConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
