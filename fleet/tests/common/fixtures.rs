//! Test fixtures and data for fleet tests

use fleet::FleetConfig;
use shared::UnitOfWork;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Startup timeout for fleets of real processes
    pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

    /// Timeout for waits that are expected to fail
    pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);

    pub const DEFAULT_VM_COUNT: u32 = 4;

    pub const OLD_VERSION: &'static str = "1.0";

    /// The worker binary built alongside these tests
    pub fn worker_binary() -> PathBuf {
        PathBuf::from(env!("CARGO_BIN_EXE_fleet-worker"))
    }

    /// Configuration for a fleet of real worker processes
    pub fn real_config(workspace: &Path, vms: u32) -> FleetConfig {
        FleetConfig::builder()
            .worker_executable(Self::worker_binary())
            .version_executable(Self::OLD_VERSION, Self::worker_binary())
            .workspace_dir(workspace)
            .vms(vms)
            .startup_timeout(Self::STARTUP_TIMEOUT)
            .log_level("debug")
            .build()
    }

    /// Configuration for a mock-backed fleet; nothing is spawned
    pub fn mock_config(workspace: &Path, vms: u32) -> FleetConfig {
        FleetConfig::builder()
            .workspace_dir(workspace)
            .vms(vms)
            .startup_timeout(Self::SHORT_TIMEOUT)
            .suspect_log(false)
            .build()
    }

    /// Unit of work that makes a worker log `message` at `level`
    pub fn log_unit(level: &str, message: &str) -> UnitOfWork {
        UnitOfWork::with_args("log", &serde_json::json!({ "level": level, "message": message }))
            .expect("log arguments serialize")
    }

    pub fn ping_unit() -> UnitOfWork {
        UnitOfWork::new("ping")
    }

    pub fn vm_info_unit() -> UnitOfWork {
        UnitOfWork::new("vm_info")
    }
}
