//! Configuration Management
//!
//! This module provides configuration structures and builders for fleet setup.

pub mod builder;
pub mod fleet;

// Re-export main types
pub use builder::FleetConfigBuilder;
pub use fleet::FleetConfig;
