//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::SharedError;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Well-known directory name of the coordination endpoint
pub const MASTER_NAME: &str = "master";

/// Well-known directory name of the bootstrap/locator worker
pub const LOCATOR_NAME: &str = "locator";

/// Raw slot number reserved for the locator worker
pub const LOCATOR_VM_NUM: i32 = -2;

/// Raw slot number reserved for the in-process debugging VM
pub const DEBUGGING_VM_NUM: i32 = -1;

/// Logical worker slot
///
/// The two reserved slots are modelled as their own variants so that callers
/// never have to compare against magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VmId {
    /// Worker hosting the bootstrap (discovery) service
    Locator,
    /// The coordinator's own process, no subprocess behind it
    Debug,
    /// Regular pool worker
    Worker(u32),
}

impl VmId {
    /// Map a raw slot number (`-2`, `-1`, `0..`) onto a slot
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            LOCATOR_VM_NUM => Some(VmId::Locator),
            DEBUGGING_VM_NUM => Some(VmId::Debug),
            n if n >= 0 => Some(VmId::Worker(n as u32)),
            _ => None,
        }
    }

    pub fn raw(&self) -> i32 {
        match self {
            VmId::Locator => LOCATOR_VM_NUM,
            VmId::Debug => DEBUGGING_VM_NUM,
            VmId::Worker(n) => *n as i32,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, VmId::Worker(_))
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmId::Locator => write!(f, "locator"),
            VmId::Debug => write!(f, "debug"),
            VmId::Worker(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for VmId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "locator" => Ok(VmId::Locator),
            "debug" => Ok(VmId::Debug),
            other => other
                .parse::<i32>()
                .ok()
                .and_then(VmId::from_raw)
                .ok_or_else(|| SharedError::InvalidVmId { input: s.to_string() }),
        }
    }
}

/// Build/version a worker runs under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Version {
    /// The build the coordinator itself was compiled from
    #[default]
    Current,
    /// Any other build, identified by its tag
    Named(String),
}

impl Version {
    pub const CURRENT_TAG: &'static str = "current";

    pub fn named(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag.is_empty() || tag == Self::CURRENT_TAG {
            Version::Current
        } else {
            Version::Named(tag)
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Version::Current)
    }

    pub fn tag(&self) -> &str {
        match self {
            Version::Current => Self::CURRENT_TAG,
            Version::Named(tag) => tag,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Version {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().any(char::is_whitespace) {
            return Err(SharedError::InvalidConfig {
                field: "version".to_string(),
                value: s.to_string(),
            });
        }
        Ok(Version::named(s))
    }
}

/// Version-qualified worker identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerKey {
    pub id: VmId,
    pub version: Version,
}

impl WorkerKey {
    pub fn new(id: VmId, version: Version) -> Self {
        Self { id, version }
    }

    pub fn current(id: VmId) -> Self {
        Self::new(id, Version::Current)
    }

    /// Deterministic directory name for this worker
    pub fn vm_name(&self) -> String {
        match (&self.id, &self.version) {
            (VmId::Locator, _) => LOCATOR_NAME.to_string(),
            (id, Version::Current) => format!("vm{}", id.raw()),
            (id, Version::Named(tag)) => format!("vm{}_v{}", id.raw(), tag),
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vm_name())
    }
}

/// Lifecycle of a managed worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    /// Spawned, readiness not yet signalled
    Launching,
    /// Endpoint bound and readiness signalled
    Ready,
    /// Being killed so it can be relaunched
    Bounced,
    /// Killed for good
    Dead,
}

/// Address of a remotely invocable object plus the incarnation behind it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub pid: u32,
    /// Launch generation of the process serving this endpoint
    pub generation: u64,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}, gen {})", self.addr, self.pid, self.generation)
    }
}

/// Process identifier used for log attribution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The coordinating process (singleton)
    Coordinator,
    /// A spawned worker process
    Vm(VmId),
}

impl ProcessId {
    /// Initialize the global process ID for the coordinator
    pub fn init_coordinator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }

    /// Initialize the global process ID for a worker process
    pub fn init_vm(id: VmId) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Vm(id))
    }

    /// Get the global process ID, defaulting to the coordinator
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Coordinator => write!(f, "coordinator"),
            ProcessId::Vm(VmId::Locator) => write!(f, "locator"),
            ProcessId::Vm(id) => write!(f, "vm{}", id.raw()),
        }
    }
}
