//! TCP + bincode request/response transport
//!
//! Every exchange is one connection carrying one length-prefixed request frame
//! and one length-prefixed response frame. Frames are a 4-byte big-endian
//! length followed by the bincode payload.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::errors::{SharedError, SharedResult};
use crate::types::ProcessId;

/// Upper bound on a single frame
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// How long a caller waits for a TCP connect
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Write one frame
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> SharedResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message).map_err(|e| SharedError::SerializationError {
        message: e.to_string(),
    })?;
    if data.len() > MAX_FRAME_LEN {
        return Err(SharedError::ProtocolError {
            message: format!("frame of {} bytes exceeds limit", data.len()),
        });
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
pub async fn read_frame<R, T>(reader: &mut R) -> SharedResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(SharedError::ProtocolError {
            message: format!("announced frame of {len} bytes exceeds limit"),
        });
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    bincode::deserialize(&data).map_err(|e| SharedError::DeserializationError {
        message: e.to_string(),
    })
}

/// Send a request and wait for its response
///
/// Any transport failure (refused, reset, closed mid-exchange) is reported as
/// [`SharedError::Unreachable`]; a malformed reply is a protocol error.
pub async fn call<Req, Resp>(addr: SocketAddr, request: &Req) -> SharedResult<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let mut stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(unreachable(addr, e)),
        Err(_) => {
            return Err(SharedError::Unreachable {
                addr,
                message: format!("connect timed out after {CONNECT_TIMEOUT:?}"),
            })
        }
    };

    write_frame(&mut stream, request).await.map_err(|e| lift_io(addr, e))?;
    read_frame(&mut stream).await.map_err(|e| lift_io(addr, e))
}

/// [`call`] bounded by an overall deadline
pub async fn call_with_timeout<Req, Resp>(addr: SocketAddr, request: &Req, timeout: Duration) -> SharedResult<Resp>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    match tokio::time::timeout(timeout, call(addr, request)).await {
        Ok(result) => result,
        Err(_) => Err(SharedError::Unreachable {
            addr,
            message: format!("no reply within {timeout:?}"),
        }),
    }
}

fn unreachable(addr: SocketAddr, e: std::io::Error) -> SharedError {
    SharedError::Unreachable {
        addr,
        message: e.to_string(),
    }
}

fn lift_io(addr: SocketAddr, e: SharedError) -> SharedError {
    match e {
        SharedError::IoError(io) => unreachable(addr, io),
        other => other,
    }
}

/// Server-side request processing
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    async fn handle(&self, request: Self::Request) -> Self::Response;
}

/// Running accept loop; aborted on shutdown or drop
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind `bind_addr` and serve requests with `handler` until shut down
pub async fn serve<H: RequestHandler>(bind_addr: SocketAddr, handler: Arc<H>) -> SharedResult<ServerHandle> {
    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let task = tokio::spawn(async move {
        while let Ok((mut stream, peer)) = listener.accept().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                let request: H::Request = match read_frame(&mut stream).await {
                    Ok(request) => request,
                    Err(e) => {
                        crate::process_debug!(ProcessId::current(), "Dropping connection from {}: {}", peer, e);
                        return;
                    }
                };

                let response = handler.handle(request).await;
                if let Err(e) = write_frame(&mut stream, &response).await {
                    crate::process_debug!(ProcessId::current(), "Reply to {} failed: {}", peer, e);
                }
            });
        }
    });

    Ok(ServerHandle { local_addr, task })
}
