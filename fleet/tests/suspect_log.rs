//! Suspect log checks against real worker processes
//!
//! The coordinator has a single suspect log per process, so the fleets in
//! this binary run one at a time.

mod common;
use common::{TestFixtures, TestHelpers};

use fleet::{Fleet, FleetError, PatternScanner, RealProcessManager};
use shared::VmId;
use std::sync::OnceLock;
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard};

static SERIAL: OnceLock<Mutex<()>> = OnceLock::new();

async fn launch(vms: u32) -> (MutexGuard<'static, ()>, TempDir, Fleet<RealProcessManager>) {
    let guard = SERIAL.get_or_init(|| Mutex::new(())).lock().await;
    TestHelpers::init_logging();
    let workspace = TempDir::new().unwrap();
    let fleet = Fleet::launch(TestFixtures::real_config(workspace.path(), vms))
        .await
        .expect("fleet boots");
    (guard, workspace, fleet)
}

/// Errors logged by a worker fail the next suspect check, once
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_errors_are_suspect() {
    let (_serial, workspace, fleet) = launch(1).await;
    let vm = fleet.vm(VmId::Worker(0)).await.unwrap();
    assert!(workspace.path().join("dunit_suspect.log").exists());

    fleet.close_and_check_for_suspects().unwrap();

    vm.invoke(&TestFixtures::log_unit("error", "disk on fire")).await.unwrap();
    match fleet.close_and_check_for_suspects() {
        Err(FleetError::SuspectStrings { report }) => assert!(report.contains("disk on fire")),
        other => panic!("expected suspect strings, got {other:?}"),
    }
    fleet.close_and_check_for_suspects().unwrap();

    // Excused lines pass
    vm.invoke(&TestFixtures::log_unit("error", "expected outage")).await.unwrap();
    let scanner = PatternScanner::new().ignore("expected outage").unwrap();
    fleet.close_and_check_for_suspects_with(&scanner).unwrap();

    fleet.teardown().await;
}

/// Errors logged in the coordinator, through the debug VM, are checked too
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_coordinator_errors_are_suspect() {
    let (_serial, workspace, fleet) = launch(0).await;
    let suspect_file = workspace.path().join("dunit_suspect.log");
    assert_eq!(shared::logging::attached_suspect_log(), Some(suspect_file.clone()));

    fleet.close_and_check_for_suspects().unwrap();

    fleet
        .debug_vm()
        .invoke(&TestFixtures::log_unit("error", "coordinator side failure"))
        .await
        .unwrap();
    match fleet.close_and_check_for_suspects() {
        Err(FleetError::SuspectStrings { report }) => assert!(report.contains("coordinator side failure")),
        other => panic!("expected suspect strings, got {other:?}"),
    }

    // Teardown stops the coordinator writing into the workspace
    fleet.teardown().await;
    assert_eq!(shared::logging::attached_suspect_log(), None);
}
