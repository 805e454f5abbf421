//! Shared error types for the fleet system

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Serialization failed: {message}")]
    SerializationError { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },

    #[error("Invalid VM id: {input}")]
    InvalidVmId { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Message protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Endpoint {addr} unreachable: {message}")]
    Unreachable { addr: SocketAddr, message: String },

    #[error("Remote method failed: {message}")]
    MethodFailed { message: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SharedError {
    /// True when the failure means the remote side is gone rather than misbehaving
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SharedError::Unreachable { .. })
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
