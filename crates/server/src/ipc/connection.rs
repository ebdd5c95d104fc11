//! Per-peer connection handler
//!
//! Serves requests one at a time: each request is applied to the
//! controller before the next one is read, and every well-formed request
//! gets exactly one "OK" reply. A malformed or oversized frame ends the
//! connection without a reply.

use common::ControllerBridge;
use protocol::{IpcReply, IpcRequest, ProtocolError, read_framed_async, write_framed_async};
use tokio::net::UnixStream;
use tracing::{debug, error, info, warn};

/// Per-peer connection handler
pub struct Connection {
    id: u64,
    stream: UnixStream,
    bridge: ControllerBridge,
}

impl Connection {
    pub fn new(id: u64, stream: UnixStream, bridge: ControllerBridge) -> Self {
        Self { id, stream, bridge }
    }

    /// Serve requests until the peer disconnects or sends garbage
    pub async fn run(mut self) {
        match self.stream.peer_cred() {
            Ok(cred) => info!(
                "Connection {} accepted (uid={}, gid={}, pid={:?})",
                self.id,
                cred.uid(),
                cred.gid(),
                cred.pid()
            ),
            Err(e) => info!("Connection {} accepted (peer unknown: {})", self.id, e),
        }

        loop {
            let request: IpcRequest = match read_framed_async(&mut self.stream).await {
                Ok(request) => request,
                Err(e) if e.is_disconnect() => {
                    debug!("Connection {} closed by peer", self.id);
                    break;
                }
                Err(e) => {
                    warn!("Connection {}: dropping after bad request: {}", self.id, e);
                    break;
                }
            };

            if let Err(e) = self.handle_request(&request).await {
                if e.is_disconnect() {
                    debug!("Connection {} closed before reply", self.id);
                } else {
                    warn!("Connection {}: failed to send reply: {}", self.id, e);
                }
                break;
            }
        }

        debug!("Connection {} finished", self.id);
    }

    async fn handle_request(&mut self, request: &IpcRequest) -> Result<(), ProtocolError> {
        info!(
            "Received request: id_product={}, id_vendor={}, request={}",
            request.id_product, request.id_vendor, request.request
        );

        // Reply is always OK; failures are only logged
        if let Err(e) = self.bridge.apply(request.action()).await {
            error!("Failed to apply {:?}: {}", request.action(), e);
        }

        write_framed_async(&mut self.stream, &IpcReply::ok()).await
    }
}
