//! Naming directory protocol

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Endpoint;

/// Requests served by the naming directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DirectoryRequest {
    /// Register an endpoint under a name
    Bind { name: String, endpoint: Endpoint },

    /// Resolve a name
    Lookup { name: String },

    /// Enumerate bound names
    List,

    /// Drop a binding (no-op if absent)
    Unbind { name: String },
}

/// Replies from the naming directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DirectoryResponse {
    Bound,
    Found(Endpoint),
    Names(Vec<String>),
    Unbound,
    Error(DirectoryFault),
}

/// Directory-level refusal, carried as data across the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryFault {
    DuplicateName(String),
    NotFound(String),
}

impl fmt::Display for DirectoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryFault::DuplicateName(name) => write!(f, "name already bound: {name}"),
            DirectoryFault::NotFound(name) => write!(f, "name not bound: {name}"),
        }
    }
}
