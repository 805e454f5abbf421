//! Worker execution protocol

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{SharedError, SharedResult};

/// Requests served by a worker endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    Execute(UnitOfWork),
    Ping,
}

/// Replies from a worker endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    Result(MethodResult),
    Pong,
}

/// A named task plus its JSON-encoded arguments
///
/// Code cannot cross a process boundary, so work is addressed by the name it
/// was registered under in the worker's task registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfWork {
    pub task: String,
    pub args: String,
}

impl UnitOfWork {
    /// Task without arguments
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: "null".to_string(),
        }
    }

    /// Task with serializable arguments
    pub fn with_args<T: Serialize>(task: impl Into<String>, args: &T) -> SharedResult<Self> {
        let args = serde_json::to_string(args).map_err(|e| SharedError::SerializationError {
            message: format!("task arguments: {e}"),
        })?;
        Ok(Self {
            task: task.into(),
            args,
        })
    }

    /// Decode the arguments
    pub fn args<T: DeserializeOwned>(&self) -> SharedResult<T> {
        serde_json::from_str(&self.args).map_err(|e| SharedError::DeserializationError {
            message: format!("arguments of task '{}': {e}", self.task),
        })
    }
}

/// Outcome of a remote invocation
///
/// A failure here means the invoked code failed; the call itself went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodResult {
    /// JSON-encoded return value
    Value(String),
    /// Captured error or panic
    Failure { message: String, trace: Option<String> },
}

impl MethodResult {
    pub fn value<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => MethodResult::Value(json),
            Err(e) => MethodResult::failure(format!("could not encode return value: {e}")),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        MethodResult::Failure {
            message: message.into(),
            trace: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MethodResult::Failure { .. })
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            MethodResult::Failure { message, .. } => Some(message),
            MethodResult::Value(_) => None,
        }
    }

    /// Decode the returned value, turning a captured failure into an error
    pub fn decode<T: DeserializeOwned>(&self) -> SharedResult<T> {
        match self {
            MethodResult::Value(json) => serde_json::from_str(json).map_err(|e| SharedError::DeserializationError {
                message: format!("return value: {e}"),
            }),
            MethodResult::Failure { message, .. } => Err(SharedError::MethodFailed {
                message: message.clone(),
            }),
        }
    }
}
