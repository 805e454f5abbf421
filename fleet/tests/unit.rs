//! Unit tests for the fleet and master against a mock process manager
//!
//! No process is spawned: the mock keeps a fake process table and the stubs
//! it hands out point at workers served in-process.

mod common;
use common::{MockFleetBuilder, TestFixtures, TestHelpers};

use fleet::child::TaskRegistry;
use fleet::traits::MockProcessManager;
use fleet::{FleetError, FleetLifecycle, Master, MasterServer};
use shared::{MasterStub, Version, VmId, WorkerKey};
use std::sync::Arc;
use std::time::Duration;

/// Bootstrap launches the locator alone, then the initial pool
#[tokio::test]
async fn test_bootstrap_launch_order() {
    // Arrange
    let mock = MockFleetBuilder::new().with_vms(3).build().await;

    // Act
    mock.fleet.start().await.unwrap();

    // Assert
    assert_eq!(
        mock.launched_ids(),
        vec![VmId::Locator, VmId::Worker(0), VmId::Worker(1), VmId::Worker(2)]
    );
    assert_eq!(mock.fleet.vm_count(), 3);
    assert_eq!(mock.fleet.lifecycle(), FleetLifecycle::Running);
    assert!(mock.fleet.is_launched());
}

/// The port the locator reports becomes the fleet's locator address
#[tokio::test]
async fn test_bootstrap_publishes_locator_port() {
    let mock = MockFleetBuilder::new().with_vms(1).build().await;
    mock.fleet.start().await.unwrap();

    let port = mock.fleet.locator_port();
    assert_ne!(port, 0);
    assert_eq!(mock.fleet.master().locator_port(), port);
    assert_eq!(mock.fleet.locator_string(), format!("localhost[{port}]"));

    let properties = mock.fleet.distributed_system_properties();
    assert_eq!(properties["locators"], format!("localhost[{port}]"));
    assert_eq!(properties["mcast-port"], "0");
}

/// The master is bound under its configured name while the fleet runs
#[tokio::test]
async fn test_master_bound_in_directory() {
    let mock = MockFleetBuilder::new().with_vms(0).build().await;
    mock.fleet.start().await.unwrap();

    let endpoint = mock.fleet.directory().lookup("master").unwrap();
    assert_eq!(Some(endpoint.addr), mock.fleet.master_addr());

    mock.fleet.teardown().await;
    assert!(mock.fleet.directory().lookup("master").is_err());
}

/// An empty pool still boots the locator
#[tokio::test]
async fn test_zero_vms() {
    let mock = MockFleetBuilder::new().with_vms(0).build().await;
    mock.fleet.start().await.unwrap();

    assert_eq!(mock.launched_ids(), vec![VmId::Locator]);
    assert_eq!(mock.fleet.vm_count(), 0);
    mock.fleet.vm(VmId::Locator).await.unwrap().ping().await.unwrap();
}

/// A startup timeout kills everything and leaves the fleet torn down
#[tokio::test]
async fn test_startup_timeout_tears_down() {
    let mock = MockFleetBuilder::new().never_ready().build().await;

    let result = mock.fleet.start().await;

    assert!(matches!(result, Err(FleetError::StartupTimeout { .. })));
    assert_eq!(mock.fleet.lifecycle(), FleetLifecycle::TornDown);
    assert_eq!(mock.table().kills, 1);
    assert!(matches!(mock.fleet.start().await, Err(FleetError::TornDown)));
}

/// A locator without the bootstrap task fails the boot
#[tokio::test]
async fn test_locator_failure() {
    let mock = MockFleetBuilder::new()
        .with_locator_registry(TaskRegistry::empty())
        .build()
        .await;

    let result = mock.fleet.start().await;

    match result {
        Err(FleetError::LocatorError { message }) => assert!(message.contains("start_locator")),
        other => panic!("expected a locator error, got {other:?}"),
    }
    // No worker was launched after the locator failed
    assert_eq!(mock.launched_ids(), vec![VmId::Locator]);
    assert_eq!(mock.table().kills, 1);
}

/// A failing worker launch aborts the boot
#[tokio::test]
async fn test_launch_failure_propagates() {
    let mock = MockFleetBuilder::new().failing_launch_of(VmId::Worker(1)).build().await;

    let result = mock.fleet.start().await;

    assert!(matches!(result, Err(FleetError::LaunchError { .. })));
    assert_eq!(mock.fleet.lifecycle(), FleetLifecycle::TornDown);
}

/// Asking for a worker beyond the pool fills every gap in order
#[tokio::test]
async fn test_scale_up_fills_gaps() {
    let mock = MockFleetBuilder::new().with_vms(2).build().await;
    mock.fleet.start().await.unwrap();

    let vm = mock.fleet.vm(VmId::Worker(5)).await.unwrap();

    assert_eq!(vm.id(), VmId::Worker(5));
    assert_eq!(mock.fleet.vm_count(), 6);
    assert_eq!(
        mock.launched_ids()[3..],
        [VmId::Worker(2), VmId::Worker(3), VmId::Worker(4), VmId::Worker(5)]
    );
    vm.ping().await.unwrap();
}

/// Only the requested worker gets the requested version
#[tokio::test]
async fn test_scale_up_with_version() {
    let mock = MockFleetBuilder::new().with_vms(1).build().await;
    mock.fleet.start().await.unwrap();

    let vm = mock
        .fleet
        .vm_with_version(Version::named(TestFixtures::OLD_VERSION), VmId::Worker(2))
        .await
        .unwrap();

    assert_eq!(vm.version(), &Version::named(TestFixtures::OLD_VERSION));
    assert_eq!(vm.stub().unwrap().name, "vm2_v1.0");

    let table = mock.table();
    let gap = table.launched.iter().find(|key| key.id == VmId::Worker(1)).unwrap();
    assert_eq!(gap.version, Version::Current);
}

/// Asking for a present worker on another version bounces it
#[tokio::test]
async fn test_version_change_bounces_worker() {
    let mock = MockFleetBuilder::new().with_vms(2).build().await;
    mock.fleet.start().await.unwrap();
    let before = mock.fleet.vm(VmId::Worker(1)).await.unwrap();

    let after = mock
        .fleet
        .vm_with_version(Version::named(TestFixtures::OLD_VERSION), VmId::Worker(1))
        .await
        .unwrap();

    assert_eq!(
        mock.table().bounced,
        vec![WorkerKey::new(VmId::Worker(1), Version::named(TestFixtures::OLD_VERSION))]
    );
    assert_ne!(before.stub(), after.stub());
    assert_eq!(mock.fleet.vm_count(), 2);

    // Same version again: no further bounce
    mock.fleet
        .vm_with_version(Version::named(TestFixtures::OLD_VERSION), VmId::Worker(1))
        .await
        .unwrap();
    assert_eq!(mock.table().bounced.len(), 1);

    assert_eq!(mock.fleet.reset_versions().await.unwrap(), 1);
    assert_eq!(mock.table().bounced.last().unwrap().version, Version::Current);
}

/// A bounce hands back the new incarnation's stub
#[tokio::test]
async fn test_bounce_returns_fresh_stub() {
    let mock = MockFleetBuilder::new().with_vms(3).build().await;
    mock.fleet.start().await.unwrap();
    let old = mock.fleet.vm(VmId::Worker(2)).await.unwrap();

    let result = mock.fleet.bounce(VmId::Worker(2)).await.unwrap();

    assert_eq!(result.id, VmId::Worker(2));
    assert_ne!(Some(&result.stub), old.stub());
    assert_eq!(Some(result.stub.generation()), mock.table().generation_of(VmId::Worker(2)));
    assert_eq!(mock.fleet.vm(VmId::Worker(2)).await.unwrap().stub(), Some(&result.stub));
}

/// Bouncing a worker that was never launched
#[tokio::test]
async fn test_bounce_unknown_worker() {
    let mock = MockFleetBuilder::new().with_vms(2).build().await;
    mock.fleet.start().await.unwrap();

    let error = mock.fleet.bounce(VmId::Worker(7)).await.unwrap_err();

    assert!(matches!(TestHelpers::bounce_cause(error), FleetError::NotBound { .. }));
    assert!(mock.table().bounced.is_empty());
}

/// A bounced worker that never comes back is a startup timeout
#[tokio::test]
async fn test_bounce_timeout() {
    let mock = MockFleetBuilder::new().bounced_never_ready().build().await;
    mock.fleet.start().await.unwrap();

    let error = mock.fleet.bounce(VmId::Worker(0)).await.unwrap_err();

    assert!(matches!(TestHelpers::bounce_cause(error), FleetError::StartupTimeout { .. }));
}

/// The debug VM runs tasks in the test process
#[tokio::test]
async fn test_debug_vm_is_local() {
    let mock = MockFleetBuilder::new().with_vms(0).build().await;
    mock.fleet.start().await.unwrap();

    let vm = mock.fleet.vm(VmId::Debug).await.unwrap();
    assert!(vm.is_local());
    assert!(vm.stub().is_none());

    let pong: String = vm.invoke_as(&TestFixtures::ping_unit()).await.unwrap();
    assert_eq!(pong, "pong");

    let info = TestHelpers::vm_info(&vm).await.unwrap();
    assert_eq!(info.id, VmId::Debug);
    assert_eq!(info.pid, std::process::id());

    // Exiting would take the test process down with it
    let exit = vm.invoke(&shared::UnitOfWork::new("exit")).await.unwrap();
    assert!(exit.is_failure());
    assert!(!mock.launched_ids().contains(&VmId::Debug));
}

/// Custom tasks can be registered for the debug VM
#[tokio::test]
async fn test_debug_registry() {
    let mut registry = TaskRegistry::empty();
    registry.register("answer", |_, _| Ok(42u32));
    let mock = MockFleetBuilder::new().with_vms(0).build().await;
    let fleet = mock.fleet.with_debug_registry(registry);

    let answer: u32 = fleet
        .debug_vm()
        .invoke_as(&shared::UnitOfWork::new("answer"))
        .await
        .unwrap();
    assert_eq!(answer, 42);
}

/// Teardown runs once; everything afterwards is refused
#[tokio::test]
async fn test_teardown_is_idempotent() {
    let mock = MockFleetBuilder::new().with_vms(1).build().await;
    mock.fleet.start().await.unwrap();

    mock.fleet.teardown().await;
    mock.fleet.teardown().await;

    assert_eq!(mock.table().kills, 1);
    assert_eq!(mock.fleet.lifecycle(), FleetLifecycle::TornDown);
    assert!(matches!(mock.fleet.vm(VmId::Worker(0)).await, Err(FleetError::TornDown)));
    assert!(matches!(mock.fleet.bounce(VmId::Worker(0)).await, Err(FleetError::TornDown)));
}

/// Workers cannot be requested before the fleet starts
#[tokio::test]
async fn test_not_started() {
    let mock = MockFleetBuilder::new().build().await;

    assert_eq!(mock.fleet.lifecycle(), FleetLifecycle::Created);
    assert!(mock.fleet.vm(VmId::Worker(0)).await.is_err());
    assert!(mock.fleet.close_and_check_for_suspects().is_ok());
    assert!(mock.launched_ids().is_empty());
}

/// Readiness signals reach the process manager through the master endpoint
#[tokio::test]
async fn test_master_endpoint() {
    let mut process_manager = MockProcessManager::new();
    process_manager
        .expect_signal_vm_ready()
        .withf(|id, generation| *id == VmId::Worker(3) && *generation == 9)
        .times(1)
        .returning(|_, _| true);
    process_manager
        .expect_bounce()
        .times(1)
        .returning(|key| Err(FleetError::launch(key.vm_name(), "no such executable")));

    let master = Arc::new(Master::new(Arc::new(process_manager), Duration::from_secs(1)));
    master.set_locator_port(10334);
    let server = MasterServer::start(master, "127.0.0.1:0".parse().unwrap()).await.unwrap();
    let stub = MasterStub::new(server.local_addr());

    stub.ping().await.unwrap();
    assert_eq!(stub.get_locator_port().await.unwrap(), 10334);
    assert!(stub.signal_vm_ready(VmId::Worker(3), 9).await.unwrap());

    let refused = stub.bounce(VmId::Worker(3)).await.unwrap_err();
    assert!(refused.to_string().contains("no such executable"));
}

/// The locator keeps its bootstrap service for the whole run
#[tokio::test]
async fn test_locator_is_never_bounced() {
    let mock = MockFleetBuilder::new().with_vms(1).build().await;
    mock.fleet.start().await.unwrap();
    let port = mock.fleet.locator_port();

    let error = mock.fleet.bounce(VmId::Locator).await.unwrap_err();
    assert!(matches!(TestHelpers::bounce_cause(error), FleetError::LaunchError { .. }));

    let other_version = mock
        .fleet
        .vm_with_version(Version::named(TestFixtures::OLD_VERSION), VmId::Locator)
        .await;
    assert!(matches!(other_version, Err(FleetError::LaunchError { .. })));

    assert!(mock.table().bounced.is_empty());
    assert_eq!(mock.fleet.locator_port(), port);
    mock.fleet.vm(VmId::Locator).await.unwrap().ping().await.unwrap();
}
