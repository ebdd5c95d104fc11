//! Async client for the helper socket
//!
//! Callers normally live outside this workspace; this client exists so the
//! socket can be exercised from tests and shell tooling.

use crate::codec::{read_framed_async, write_framed_async};
use crate::error::Result;
use crate::messages::{IpcReply, IpcRequest};
use std::path::Path;
use tokio::net::UnixStream;

/// A single connection to the helper
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the helper listening on `socket_path`
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        Ok(Self { stream })
    }

    /// Send one request and wait for its reply
    pub async fn send(&mut self, request: &IpcRequest) -> Result<IpcReply> {
        write_framed_async(&mut self.stream, request).await?;
        read_framed_async(&mut self.stream).await
    }
}

/// Connect, send one request, and return the reply
pub async fn send_request(socket_path: &Path, request: &IpcRequest) -> Result<IpcReply> {
    let mut client = IpcClient::connect(socket_path).await?;
    client.send(request).await
}
