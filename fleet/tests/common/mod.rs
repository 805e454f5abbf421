//! Common test utilities and infrastructure
//!
//! Fixtures, the mock-backed fleet builder and helpers shared by the unit and
//! integration suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{FakeTable, LocalWorker, MockFleet, MockFleetBuilder, TestHelpers};
